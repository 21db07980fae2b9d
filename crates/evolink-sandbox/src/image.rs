//! Sealed client-plus-substitute execution bundle

use crate::link::Resolution;
use evolink_artifact::Artifact;
use serde::{Deserialize, Serialize};

/// Everything the executor needs, in one serializable unit.
///
/// An image crosses a process boundary (parent suite → `exec-image` child),
/// so both artifacts re-verify their content hashes after deserialization;
/// a corrupted image must never execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedImage {
    client: Artifact,
    substitute: Artifact,
    resolution: Resolution,
}

impl LinkedImage {
    /// Seal a linked image.
    #[must_use]
    pub fn new(client: Artifact, substitute: Artifact, resolution: Resolution) -> Self {
        Self {
            client,
            substitute,
            resolution,
        }
    }

    /// The unchanged client program.
    #[inline]
    #[must_use]
    pub fn client(&self) -> &Artifact {
        &self.client
    }

    /// The artifact the client's imports were re-bound to.
    #[inline]
    #[must_use]
    pub fn substitute(&self) -> &Artifact {
        &self.substitute
    }

    /// The per-import binding map.
    #[inline]
    #[must_use]
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Both artifacts still match their content hashes.
    #[must_use]
    pub fn verify(&self) -> bool {
        self.client.verify() && self.substitute.verify()
    }

    /// Encode for the process boundary.
    ///
    /// # Errors
    /// Returns an error if the image fails to serialize.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from the process boundary.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
