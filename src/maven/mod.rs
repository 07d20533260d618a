//! Coordinates, descriptors and the transitive dependency resolver.
//!
//! Descriptors live in an arena owned by [`Resolver`] and refer to each
//! other through [`DescriptorId`]s. Remote artifacts are cached in the
//! local repository once their SHA-1 digests check out.

pub mod coordinate;
pub mod descriptor;
pub mod fetch;
pub mod metadata;
pub mod module_build;
pub mod resolver;
pub mod store;
pub mod version;

pub use coordinate::{Coordinate, CoordinateKey};
pub use descriptor::{Descriptor, DescriptorId, Packaging, ProfileActivation};
pub use fetch::{Fetcher, HttpTransport, Transport};
pub use metadata::Metadata;
pub use resolver::Resolver;
pub use version::{VersionRange, compare_versions};
