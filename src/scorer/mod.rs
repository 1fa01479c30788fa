pub mod chunked;

pub use chunked::ChunkedScorer;
