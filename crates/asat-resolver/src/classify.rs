use crate::error::ResolutionErrorKind;

/// A diagnostic substring and the failure it identifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMarker {
    pub marker: String,
    pub kind: ResolutionErrorKind,
}

impl FailureMarker {
    pub fn new(marker: impl Into<String>, kind: ResolutionErrorKind) -> Self {
        Self {
            marker: marker.into(),
            kind,
        }
    }
}

/// Ordered marker list; the first marker found in the output decides the
/// classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureClassifier {
    markers: Vec<FailureMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ResolutionErrorKind,
    /// Last output line containing the matched marker, empty when unknown.
    pub detail_line: String,
}

impl FailureClassifier {
    pub fn new(markers: Vec<FailureMarker>) -> Self {
        Self { markers }
    }

    /// Maven diagnostics, most specific first: a child-module failure
    /// outranks build extensions, then malformed descriptors, then
    /// unresolvable parents, then parse failures.
    pub fn maven() -> Self {
        Self::new(vec![
            FailureMarker::new("Child module", ResolutionErrorKind::ChildModuleFailure),
            FailureMarker::new(
                "Unresolvable build extension",
                ResolutionErrorKind::UnresolvableBuildExtension,
            ),
            FailureMarker::new("Malformed POM", ResolutionErrorKind::MalformedDescriptor),
            FailureMarker::new(
                "Non-resolvable parent POM for",
                ResolutionErrorKind::UnresolvableParent,
            ),
            FailureMarker::new("Non-parseable POM", ResolutionErrorKind::DescriptorParseFailure),
        ])
    }

    pub fn markers(&self) -> &[FailureMarker] {
        &self.markers
    }

    pub fn push(&mut self, marker: FailureMarker) {
        self.markers.push(marker);
    }

    pub fn classify(&self, output: &str) -> Classification {
        let Some(matched) = self
            .markers
            .iter()
            .find(|marker| !marker.marker.is_empty() && output.contains(marker.marker.as_str()))
        else {
            return Classification {
                kind: ResolutionErrorKind::UnknownEvaluationFailure,
                detail_line: String::new(),
            };
        };

        let detail_line = output
            .lines()
            .rev()
            .find(|line| line.contains(matched.marker.as_str()))
            .unwrap_or_default()
            .trim()
            .to_owned();
        Classification {
            kind: matched.kind,
            detail_line,
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::maven()
    }
}
