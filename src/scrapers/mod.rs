pub mod browser;
pub mod extract;
pub mod http;
pub mod immowelt;
pub mod kleinanzeigen;
pub mod patterns;
pub mod traits;
pub mod wg_gesucht;

pub use http::{FetchError, FetchOptions};
pub use immowelt::ImmoweltScraper;
pub use kleinanzeigen::KleinanzeigenScraper;
pub use traits::{ListingSource, PageFetcher};
pub use wg_gesucht::WgGesuchtScraper;
