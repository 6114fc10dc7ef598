pub mod attempt;
pub mod fetcher;

pub use attempt::attempt;
pub use fetcher::Fetcher;
