pub mod config;
pub mod layout;
pub mod metadata;
pub mod raw_codec;
pub mod recovery;
pub mod seed;
pub mod slicer;
pub mod transform;

pub use config::Config;
pub use layout::{FragmentKey, Layout};
pub use metadata::{MetadataRecord, MetadataStore};
pub use raw_codec::RawCodec;
pub use recovery::{reconstruct, ReconstructOptions, RecoveryReport};
pub use slicer::{ExtractOptions, ExtractReport, Slicer};
pub use transform::{Transform, TransformChain};
