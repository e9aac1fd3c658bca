pub mod claims;
pub mod config;
pub mod report;
pub mod source;
pub mod taxonomy;

pub use claims::{Claim, Quote, SimilarClaim};
pub use config::{ProviderKind, RunConfig};
pub use source::{QuoteRef, Source, SourceIndex};
pub use taxonomy::{Subtopic, Topic};
