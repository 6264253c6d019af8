use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

/// Substitutable placeholders a file-name pattern may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    MainDir,
    RawInputPath,
    FeaturesInputPath,
    FeaturesOutputPath,
    InputRawFilename,
    InputInjectionName,
    OutputInjectionName,
    InputGroupName,
    OutputGroupName,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::MainDir => "MAIN_DIR",
            Tag::RawInputPath => "RAW_INPUT_PATH",
            Tag::FeaturesInputPath => "FEATURES_INPUT_PATH",
            Tag::FeaturesOutputPath => "FEATURES_OUTPUT_PATH",
            Tag::InputRawFilename => "INPUT_RAW_FILENAME",
            Tag::InputInjectionName => "INPUT_INJECTION_NAME",
            Tag::OutputInjectionName => "OUTPUT_INJECTION_NAME",
            Tag::InputGroupName => "INPUT_GROUP_NAME",
            Tag::OutputGroupName => "OUTPUT_GROUP_NAME",
        }
    }
}

impl FromStr for Tag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAIN_DIR" => Ok(Tag::MainDir),
            "RAW_INPUT_PATH" => Ok(Tag::RawInputPath),
            "FEATURES_INPUT_PATH" => Ok(Tag::FeaturesInputPath),
            "FEATURES_OUTPUT_PATH" => Ok(Tag::FeaturesOutputPath),
            "INPUT_RAW_FILENAME" => Ok(Tag::InputRawFilename),
            "INPUT_INJECTION_NAME" => Ok(Tag::InputInjectionName),
            "OUTPUT_INJECTION_NAME" => Ok(Tag::OutputInjectionName),
            "INPUT_GROUP_NAME" => Ok(Tag::InputGroupName),
            "OUTPUT_GROUP_NAME" => Ok(Tag::OutputGroupName),
            _ => Err(()),
        }
    }
}

/// Well-known symbolic file ids used by the built-in steps.
pub mod file_id {
    pub const RAW_INPUT: &str = "raw-input";
    pub const FEATURES_INPUT: &str = "features-input";
    pub const FEATURES_OUTPUT: &str = "features-output";
    pub const QUANTITATION_METHODS: &str = "quantitation-methods";
    pub const PARAMETERS: &str = "parameters";
    pub const SEQUENCE: &str = "sequence";
    pub const WORKFLOW: &str = "workflow";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileBinding {
    pub name_pattern: String,
    pub description: String,
    /// Whether this file may live inside a stored session at all.
    pub embeddable: bool,
    /// Whether it currently does, as opposed to being externally pathed.
    pub embedded: bool,
    pub full_path_override: Option<PathBuf>,
}

lazy_static! {
    static ref TAG_PATTERN: Regex = Regex::new(r"\$\{([A-Z_]+)\}").expect("tag regex");
}

/// Symbolic file-id to file-location bindings for one entity.
///
/// Patterns keep their `${TAG}` placeholders until a full path is asked
/// for, so tag values set after command construction still take effect at
/// dispatch time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileBindingSet {
    bindings: BTreeMap<String, FileBinding>,
    tags: BTreeMap<Tag, String>,
}

impl FileBindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding; a known id only refreshes its description and
    /// embeddable flag, keeping the existing pattern.
    pub fn add_binding(
        &mut self,
        file_id: impl Into<String>,
        name_pattern: impl Into<String>,
        description: impl Into<String>,
        embeddable: bool,
    ) {
        let file_id = file_id.into();
        match self.bindings.entry(file_id) {
            std::collections::btree_map::Entry::Occupied(mut existing) => {
                let existing = existing.get_mut();
                existing.description = description.into();
                existing.embeddable = embeddable;
            }
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(FileBinding {
                    name_pattern: name_pattern.into(),
                    description: description.into(),
                    embeddable,
                    embedded: false,
                    full_path_override: None,
                });
            }
        }
    }

    pub fn set_tag(&mut self, tag: Tag, value: impl Into<String>) {
        self.tags.insert(tag, value.into());
    }

    pub fn tag(&self, tag: Tag) -> Option<&str> {
        self.tags.get(&tag).map(String::as_str)
    }

    /// Pin an explicit path, bypassing pattern substitution.
    pub fn set_full_path(&mut self, file_id: impl Into<String>, path: impl Into<PathBuf>) {
        let file_id = file_id.into();
        self.bindings
            .entry(file_id)
            .or_default()
            .full_path_override = Some(path.into());
    }

    /// Resolve a binding to a concrete path, substituting `${TAG}` values
    /// now. Unknown ids yield `None`; unknown tags substitute empty.
    pub fn full_path(&self, file_id: &str) -> Option<PathBuf> {
        let binding = self.bindings.get(file_id)?;
        if let Some(path) = &binding.full_path_override {
            return Some(path.clone());
        }
        let resolved = TAG_PATTERN.replace_all(&binding.name_pattern, |caps: &regex::Captures| {
            caps[1]
                .parse::<Tag>()
                .ok()
                .and_then(|t| self.tags.get(&t).cloned())
                .unwrap_or_default()
        });
        Some(PathBuf::from(resolved.into_owned()))
    }

    pub fn has(&self, file_id: &str) -> bool {
        self.bindings.contains_key(file_id)
    }

    pub fn file_ids(&self) -> Vec<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }

    pub fn description(&self, file_id: &str) -> Option<&str> {
        self.bindings.get(file_id).map(|b| b.description.as_str())
    }

    pub fn is_embeddable(&self, file_id: &str) -> bool {
        self.bindings
            .get(file_id)
            .map(|b| b.embeddable)
            .unwrap_or(false)
    }

    pub fn is_embedded(&self, file_id: &str) -> bool {
        self.bindings
            .get(file_id)
            .map(|b| b.embedded)
            .unwrap_or(false)
    }

    pub fn set_embedded(&mut self, file_id: &str, embedded: bool) {
        if let Some(binding) = self.bindings.get_mut(file_id) {
            binding.embedded = embedded;
        }
    }

    /// Adopt bindings and tags from `other` that are unknown here.
    pub fn merge(&mut self, other: &FileBindingSet) {
        for (file_id, binding) in &other.bindings {
            self.bindings
                .entry(file_id.clone())
                .or_insert_with(|| binding.clone());
        }
        for (tag, value) in &other.tags {
            self.tags.entry(*tag).or_insert_with(|| value.clone());
        }
    }
}

/// The standard per-injection binding layout the built-in steps expect.
pub fn default_injection_bindings() -> FileBindingSet {
    let mut set = FileBindingSet::new();
    set.add_binding(
        file_id::RAW_INPUT,
        "${RAW_INPUT_PATH}/${INPUT_RAW_FILENAME}",
        "instrument raw data",
        false,
    );
    set.add_binding(
        file_id::FEATURES_INPUT,
        "${FEATURES_INPUT_PATH}/${INPUT_INJECTION_NAME}.features.json",
        "previously stored features",
        true,
    );
    set.add_binding(
        file_id::FEATURES_OUTPUT,
        "${FEATURES_OUTPUT_PATH}/${OUTPUT_INJECTION_NAME}.features.json",
        "computed features",
        true,
    );
    set
}

/// The standard per-segment / per-group binding layout.
pub fn default_group_bindings() -> FileBindingSet {
    let mut set = FileBindingSet::new();
    set.add_binding(
        file_id::QUANTITATION_METHODS,
        "${MAIN_DIR}/${INPUT_GROUP_NAME}_quantitationMethods.json",
        "quantitation methods",
        true,
    );
    set.add_binding(
        file_id::FEATURES_OUTPUT,
        "${FEATURES_OUTPUT_PATH}/${OUTPUT_GROUP_NAME}.features.json",
        "computed features",
        true,
    );
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_substitution_at_resolve_time() {
        let mut set = default_injection_bindings();
        set.set_tag(Tag::RawInputPath, "/data/raw");
        set.set_tag(Tag::InputRawFilename, "s1.mzML");
        assert_eq!(
            set.full_path(file_id::RAW_INPUT).unwrap(),
            PathBuf::from("/data/raw/s1.mzML")
        );
    }

    #[test]
    fn test_late_tag_change_takes_effect() {
        let mut set = default_injection_bindings();
        set.set_tag(Tag::FeaturesOutputPath, "/out");
        set.set_tag(Tag::OutputInjectionName, "inj1");
        let before = set.full_path(file_id::FEATURES_OUTPUT).unwrap();
        set.set_tag(Tag::FeaturesOutputPath, "/elsewhere");
        let after = set.full_path(file_id::FEATURES_OUTPUT).unwrap();
        assert_eq!(before, PathBuf::from("/out/inj1.features.json"));
        assert_eq!(after, PathBuf::from("/elsewhere/inj1.features.json"));
    }

    #[test]
    fn test_unknown_tag_substitutes_empty() {
        let mut set = FileBindingSet::new();
        set.add_binding("x", "${MAIN_DIR}/x.csv", "", true);
        assert_eq!(set.full_path("x").unwrap(), PathBuf::from("/x.csv"));
    }

    #[test]
    fn test_full_path_override_wins() {
        let mut set = default_injection_bindings();
        set.set_tag(Tag::RawInputPath, "/data/raw");
        set.set_full_path(file_id::RAW_INPUT, "/pinned/file.mzML");
        assert_eq!(
            set.full_path(file_id::RAW_INPUT).unwrap(),
            PathBuf::from("/pinned/file.mzML")
        );
    }

    #[test]
    fn test_unknown_id_is_none() {
        assert!(FileBindingSet::new().full_path("nope").is_none());
    }

    #[test]
    fn test_merge_keeps_existing_entries() {
        let mut ours = FileBindingSet::new();
        ours.add_binding("x", "ours", "", false);
        ours.set_tag(Tag::MainDir, "/ours");
        let mut theirs = FileBindingSet::new();
        theirs.add_binding("x", "theirs", "", false);
        theirs.add_binding("y", "only-theirs", "", false);
        theirs.set_tag(Tag::MainDir, "/theirs");
        ours.merge(&theirs);
        assert_eq!(ours.full_path("x").unwrap(), PathBuf::from("ours"));
        assert_eq!(ours.full_path("y").unwrap(), PathBuf::from("only-theirs"));
        assert_eq!(ours.tag(Tag::MainDir), Some("/ours"));
    }

    #[test]
    fn test_embedded_flags() {
        let mut set = default_injection_bindings();
        assert!(set.is_embeddable(file_id::FEATURES_OUTPUT));
        assert!(!set.is_embeddable(file_id::RAW_INPUT));
        assert!(!set.is_embedded(file_id::FEATURES_OUTPUT));
        set.set_embedded(file_id::FEATURES_OUTPUT, true);
        assert!(set.is_embedded(file_id::FEATURES_OUTPUT));
    }
}
