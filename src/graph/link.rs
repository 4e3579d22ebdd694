// src/graph/link.rs

use std::fmt;

/// An artifact a step may produce or consume.
///
/// Links are compared by value: a step's requirement is satisfied by any
/// step whose `creates` contains a structurally equal link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Link {
    /// The resolved source commit of the repository under test.
    RootSource,
    /// A named externally supplied image, tagged into the workspace.
    BaseImage(String),
    /// The imported release payload.
    ReleaseImages,
    /// A named image built into the pipeline image stream.
    PipelineImage(String),
    /// All output images have been built.
    ImagesReady,
    /// The internal RPM repository is being served.
    RpmRepo,
    /// An externally imported image by name.
    ExternalImage(String),
}

impl Link {
    /// Whether a requirement on this link may be satisfied outside the
    /// graph when no step in the world creates it.
    pub fn resolves_externally(&self) -> bool {
        matches!(
            self,
            Link::RootSource | Link::BaseImage(_) | Link::ExternalImage(_)
        )
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::RootSource => write!(f, "source"),
            Link::BaseImage(name) => write!(f, "base image {name}"),
            Link::ReleaseImages => write!(f, "release images"),
            Link::PipelineImage(name) => write!(f, "pipeline image {name}"),
            Link::ImagesReady => write!(f, "images ready"),
            Link::RpmRepo => write!(f, "RPM repository"),
            Link::ExternalImage(name) => write!(f, "external image {name}"),
        }
    }
}

/// True iff every link in `required` is present in `satisfied`.
///
/// Order-insensitive; duplicates in `satisfied` are harmless.
pub fn has_all_links(required: &[Link], satisfied: &[Link]) -> bool {
    required
        .iter()
        .all(|link| satisfied.iter().any(|other| other == link))
}
