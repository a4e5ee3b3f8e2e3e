//! Parent-coordinate rewrites applied to a descriptor whose evaluation failed.
//!
//! Historic descriptors often point at parents that were renamed or never
//! published without a snapshot suffix. Each rule inspects the current
//! coordinates and proposes at most one replacement; rules run in order and
//! see the effect of earlier rules.

use std::fs;
use std::io;
use std::path::Path;

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::Serialize;

use crate::xml::Element;

const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentField {
    ArtifactId,
    Version,
}

impl ParentField {
    fn element_name(self) -> &'static str {
        match self {
            Self::ArtifactId => "artifactId",
            Self::Version => "version",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentReplacement {
    pub field: ParentField,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentCoordinates {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub has_relative_path: bool,
}

impl ParentCoordinates {
    fn from_parent(parent: &Element) -> Self {
        Self {
            group: parent.child_text("groupId").unwrap_or_default().to_owned(),
            artifact: parent.child_text("artifactId").unwrap_or_default().to_owned(),
            version: parent.child_text("version").unwrap_or_default().to_owned(),
            has_relative_path: parent.child("relativePath").is_some(),
        }
    }

    fn apply(&mut self, replacement: &ParentReplacement) {
        match replacement.field {
            ParentField::ArtifactId => self.artifact = replacement.new.clone(),
            ParentField::Version => self.version = replacement.new.clone(),
        }
    }

    fn is(&self, group: &str, artifact: &str) -> bool {
        self.group == group && self.artifact == artifact
    }
}

type RepairRule = fn(&ParentCoordinates) -> Option<ParentReplacement>;

const REPAIR_RULES: &[RepairRule] = &[
    commons_renamed_parent,
    commons_sandbox_renamed_parent,
    commons_sandbox_release,
    opennlp_renamed_reactor,
    unpublished_snapshot,
    streams_master_0_1,
    streams_master_0_2,
    streams_master_0_3,
    streams_osgi_components_0_1,
    commons_parent_major_version,
];

fn commons_renamed_parent(p: &ParentCoordinates) -> Option<ParentReplacement> {
    p.is("org.apache.commons", "commons")
        .then(|| artifact(p, "commons-parent"))
}

fn commons_sandbox_renamed_parent(p: &ParentCoordinates) -> Option<ParentReplacement> {
    p.is("org.apache.commons", "commons-sandbox")
        .then(|| artifact(p, "commons-sandbox-parent"))
}

fn commons_sandbox_release(p: &ParentCoordinates) -> Option<ParentReplacement> {
    (p.is("org.apache.commons", "commons-sandbox-parent") && p.version == "1.0-SNAPSHOT")
        .then(|| version(p, "1"))
}

fn opennlp_renamed_reactor(p: &ParentCoordinates) -> Option<ParentReplacement> {
    p.is("org.apache.opennlp", "opennlp-reactor")
        .then(|| artifact(p, "opennlp"))
}

// Snapshots are gone from public repositories unless resolved locally.
fn unpublished_snapshot(p: &ParentCoordinates) -> Option<ParentReplacement> {
    (p.version.contains(SNAPSHOT_SUFFIX) && !p.has_relative_path)
        .then(|| version(p, &p.version.replace(SNAPSHOT_SUFFIX, "")))
}

fn streams_master_0_1(p: &ParentCoordinates) -> Option<ParentReplacement> {
    incubating_release(p, "org.apache.streams", "streams-master", "0.1")
}

fn streams_master_0_2(p: &ParentCoordinates) -> Option<ParentReplacement> {
    incubating_release(p, "org.apache.streams", "streams-master", "0.2")
}

fn streams_master_0_3(p: &ParentCoordinates) -> Option<ParentReplacement> {
    incubating_release(p, "org.apache.streams", "streams-master", "0.3")
}

fn streams_osgi_components_0_1(p: &ParentCoordinates) -> Option<ParentReplacement> {
    incubating_release(
        p,
        "org.apache.streams.osgi-components",
        "streams-osgi-components",
        "0.1",
    )
}

// commons-parent only publishes major versions.
fn commons_parent_major_version(p: &ParentCoordinates) -> Option<ParentReplacement> {
    if !p.is("org.apache.commons", "commons-parent") {
        return None;
    }
    let (major, _) = p.version.split_once('.')?;
    Some(version(p, major))
}

fn artifact(parent: &ParentCoordinates, new: &str) -> ParentReplacement {
    ParentReplacement {
        field: ParentField::ArtifactId,
        old: parent.artifact.clone(),
        new: new.to_owned(),
    }
}

fn version(parent: &ParentCoordinates, new: &str) -> ParentReplacement {
    ParentReplacement {
        field: ParentField::Version,
        old: parent.version.clone(),
        new: new.to_owned(),
    }
}

fn incubating_release(
    parent: &ParentCoordinates,
    group: &str,
    artifact_id: &str,
    release: &str,
) -> Option<ParentReplacement> {
    let snapshot = format!("{release}{SNAPSHOT_SUFFIX}");
    (parent.is(group, artifact_id) && (parent.version == release || parent.version == snapshot))
        .then(|| version(parent, &format!("{release}-incubating")))
}

/// Replacements the rule list proposes for `parent`, in application order.
pub fn plan_parent_repairs(parent: &ParentCoordinates) -> Vec<ParentReplacement> {
    let mut current = parent.clone();
    let mut replacements = Vec::new();
    for rule in REPAIR_RULES {
        if let Some(replacement) = rule(&current) {
            current.apply(&replacement);
            replacements.push(replacement);
        }
    }
    replacements
}

/// Rewrites the parent block of the descriptor at `path` in place and returns
/// the replacements made. Descriptors that cannot be parsed are left alone.
pub fn repair_descriptor(path: &Path) -> io::Result<Vec<ParentReplacement>> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes).replace('\u{FFFD}', "");

    let root = match Element::parse(&content) {
        Ok(root) => root,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "descriptor not repairable");
            return Ok(Vec::new());
        }
    };
    let Some(parent) = root.child("parent") else {
        return Ok(Vec::new());
    };

    let replacements = plan_parent_repairs(&ParentCoordinates::from_parent(parent));
    if replacements.is_empty() {
        return Ok(Vec::new());
    }

    let mut target = ParentCoordinates::from_parent(parent);
    for replacement in &replacements {
        target.apply(replacement);
    }
    let rewritten = rewrite_parent(&content, &target)?;
    fs::write(path, rewritten)?;

    for replacement in &replacements {
        tracing::info!(
            path = %path.display(),
            field = replacement.field.element_name(),
            old = %replacement.old,
            new = %replacement.new,
            "rewrote parent coordinate"
        );
    }
    Ok(replacements)
}

fn rewrite_parent(content: &str, target: &ParentCoordinates) -> io::Result<Vec<u8>> {
    let mut reader = Reader::from_str(content);
    let mut writer = Writer::new(Vec::new());
    let mut path: Vec<String> = Vec::new();
    let mut pending: Option<&str> = None;

    loop {
        let event = reader.read_event().map_err(io::Error::other)?;
        match &event {
            Event::Start(start) => {
                path.push(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
                pending = parent_field_value(&path, target);
            }
            Event::Text(_) | Event::CData(_) if pending.is_some() || in_parent_field(&path) => {
                if let Some(value) = pending.take() {
                    write(&mut writer, Event::Text(BytesText::new(value)))?;
                }
                continue;
            }
            Event::End(_) => {
                if let Some(value) = pending.take() {
                    write(&mut writer, Event::Text(BytesText::new(value)))?;
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        write(&mut writer, event)?;
    }

    Ok(writer.into_inner())
}

fn parent_field_value<'a>(path: &[String], target: &'a ParentCoordinates) -> Option<&'a str> {
    match path {
        [project, parent, field] if project == "project" && parent == "parent" => {
            match field.as_str() {
                "artifactId" => Some(target.artifact.as_str()),
                "version" => Some(target.version.as_str()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn in_parent_field(path: &[String]) -> bool {
    matches!(path, [project, parent, field]
        if project == "project" && parent == "parent" && (field == "artifactId" || field == "version"))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> io::Result<()> {
    writer
        .write_event(event)
        .map_err(|err| io::Error::other(err.to_string()))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn coordinates(group: &str, artifact: &str, version: &str) -> ParentCoordinates {
        ParentCoordinates {
            group: group.to_owned(),
            artifact: artifact.to_owned(),
            version: version.to_owned(),
            has_relative_path: false,
        }
    }

    #[test]
    fn renamed_commons_parent_and_major_version() {
        let replacements = plan_parent_repairs(&coordinates("org.apache.commons", "commons", "1.0"));
        assert_eq!(
            replacements,
            vec![
                ParentReplacement {
                    field: ParentField::ArtifactId,
                    old: "commons".to_owned(),
                    new: "commons-parent".to_owned(),
                },
                ParentReplacement {
                    field: ParentField::Version,
                    old: "1.0".to_owned(),
                    new: "1".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn snapshot_is_stripped_only_without_relative_path() {
        let replacements =
            plan_parent_repairs(&coordinates("org.example", "parent", "2.3-SNAPSHOT"));
        assert_eq!(replacements.len(), 1);
        assert_eq!(replacements[0].new, "2.3");

        let mut local = coordinates("org.example", "parent", "2.3-SNAPSHOT");
        local.has_relative_path = true;
        assert!(plan_parent_repairs(&local).is_empty());
    }

    #[test]
    fn streams_snapshot_becomes_incubating_release() {
        let replacements =
            plan_parent_repairs(&coordinates("org.apache.streams", "streams-master", "0.2-SNAPSHOT"));
        let versions = replacements
            .iter()
            .map(|replacement| replacement.new.as_str())
            .collect::<Vec<_>>();
        assert_eq!(versions, vec!["0.2", "0.2-incubating"]);
    }

    #[test]
    fn unknown_parent_is_left_alone() {
        assert!(plan_parent_repairs(&coordinates("org.example", "parent", "1.0")).is_empty());
    }

    #[test]
    fn repair_descriptor_rewrites_only_parent_fields() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("pom.xml");
        let original = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <!-- parent moved -->
  <parent>
    <groupId>org.apache.opennlp</groupId>
    <artifactId>opennlp-reactor</artifactId>
    <version>1.5.1-incubating-SNAPSHOT</version>
  </parent>
  <artifactId>opennlp-tools</artifactId>
  <version>1.5.1-incubating-SNAPSHOT</version>
</project>
"#;
        fs::write(&path, original).expect("write pom");

        let replacements = repair_descriptor(&path).expect("repair");
        assert_eq!(replacements.len(), 2);

        let rewritten = fs::read_to_string(&path).expect("read pom");
        assert!(rewritten.contains("<artifactId>opennlp</artifactId>"));
        assert!(rewritten.contains("<version>1.5.1-incubating</version>"));
        assert!(rewritten.contains("<artifactId>opennlp-tools</artifactId>"));
        assert!(rewritten.contains("<version>1.5.1-incubating-SNAPSHOT</version>"));
        assert!(rewritten.contains("<!-- parent moved -->"));
    }

    #[test]
    fn repair_descriptor_without_parent_is_noop() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("pom.xml");
        fs::write(&path, "<project><artifactId>x</artifactId></project>").expect("write pom");
        assert!(repair_descriptor(&path).expect("repair").is_empty());

        fs::write(&path, "<project><parent>").expect("write broken pom");
        assert!(repair_descriptor(&path).expect("repair").is_empty());
    }
}
