pub mod stub;

#[cfg(feature = "landmarks-tract")]
pub mod tract;

pub use stub::StubLandmarks;

#[cfg(feature = "landmarks-tract")]
pub use tract::TractFaceMesh;
