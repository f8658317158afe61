//! # PartCatalog - Static Part Configuration
//!
//! Declares every part the composite scene can show, where its asset lives,
//! and how its visibility is grouped.
//!
//! ## Table of Contents
//!
//! 1. **Placement** - Transform handed to the scene graph at attach time
//! 2. **Membership** - Exclusive group member or independent part
//! 3. **PartSpec** - One catalog entry
//! 4. **PartCatalog** - Validated, immutable catalog
//! 5. **CatalogManifest** - TOML manifest form of the catalog

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ============================================================================
// Placement
// ============================================================================

/// Transform applied to a part when it is attached to the scene graph.
///
/// The loader never interprets it; it is resolved from the catalog at load
/// time and passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Uniform scale
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Translation `[x, y, z]`
    #[serde(default)]
    pub position: [f32; 3],
    /// Euler rotation `[x, y, z]` in radians
    #[serde(default)]
    pub rotation: [f32; 3],
}

fn default_scale() -> f32 { 1.0 }

impl Default for Placement {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            position: [0.0; 3],
            rotation: [0.0; 3],
        }
    }
}

impl Placement {
    /// Placement offset by `position`, identity otherwise
    pub fn at(position: [f32; 3]) -> Self {
        Self { position, ..Self::default() }
    }
}

// ============================================================================
// Membership
// ============================================================================

/// How a part's visibility is controlled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    /// Member of a mutually-exclusive group (at most one member visible)
    Exclusive {
        group: String,
        /// Selected by `initialize_composite` when no override is given
        default: bool,
    },
    /// Toggled on its own
    Independent {
        /// Visible after `initialize_composite` when no override is given
        default_visible: bool,
    },
}

// ============================================================================
// PartSpec
// ============================================================================

/// One catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PartSpec {
    pub id: String,
    /// Resource locator handed to the asset source
    pub locator: String,
    /// Operator-facing name (defaults to the id)
    pub display_name: String,
    pub membership: Membership,
    pub placement: Placement,
}

impl PartSpec {
    /// Member of exclusive group `group`
    pub fn exclusive(id: impl Into<String>, group: impl Into<String>, locator: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            locator: locator.into(),
            membership: Membership::Exclusive { group: group.into(), default: false },
            placement: Placement::default(),
        }
    }

    /// Independent part, hidden by default
    pub fn independent(id: impl Into<String>, locator: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            locator: locator.into(),
            membership: Membership::Independent { default_visible: false },
            placement: Placement::default(),
        }
    }

    /// Mark as the default member of its exclusive group, or as visible by
    /// default for an independent part.
    pub fn by_default(mut self) -> Self {
        match &mut self.membership {
            Membership::Exclusive { default, .. } => *default = true,
            Membership::Independent { default_visible } => *default_visible = true,
        }
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Exclusive group this part belongs to, if any
    pub fn group(&self) -> Option<&str> {
        match &self.membership {
            Membership::Exclusive { group, .. } => Some(group),
            Membership::Independent { .. } => None,
        }
    }

    pub fn is_independent(&self) -> bool {
        matches!(self.membership, Membership::Independent { .. })
    }
}

// ============================================================================
// PartCatalog
// ============================================================================

/// Validated, immutable part catalog.
#[derive(Debug, Clone)]
pub struct PartCatalog {
    /// Parts in declaration order
    parts: Vec<PartSpec>,
    /// Part id -> index into `parts`
    index: HashMap<String, usize>,
    /// Exclusive group -> member ids in declaration order
    groups: BTreeMap<String, Vec<String>>,
}

impl PartCatalog {
    pub fn builder() -> PartCatalogBuilder {
        PartCatalogBuilder::default()
    }

    /// Parse a TOML manifest (see [`CatalogManifest`]).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let manifest: CatalogManifest = toml::from_str(content)
            .map_err(|e| LoaderError::Config(format!("Failed to parse catalog: {}", e)))?;
        manifest.into_catalog()
    }

    /// Load a TOML manifest from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("Failed to read catalog {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn part(&self, id: &str) -> Option<&PartSpec> {
        self.index.get(id).map(|&i| &self.parts[i])
    }

    /// Like [`part`](Self::part) but reports `PartNotFound`.
    pub fn require_part(&self, id: &str) -> Result<&PartSpec> {
        self.part(id).ok_or_else(|| LoaderError::PartNotFound(id.to_string()))
    }

    /// All parts in declaration order
    pub fn parts(&self) -> impl Iterator<Item = &PartSpec> {
        self.parts.iter()
    }

    pub fn independent_parts(&self) -> impl Iterator<Item = &PartSpec> {
        self.parts.iter().filter(|p| p.is_independent())
    }

    /// Exclusive group names (sorted)
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Members of an exclusive group in declaration order
    pub fn group_members(&self, group: &str) -> Option<&[String]> {
        self.groups.get(group).map(Vec::as_slice)
    }

    /// Default member of an exclusive group, if one is flagged
    pub fn default_member(&self, group: &str) -> Option<&str> {
        self.groups.get(group)?.iter().map(String::as_str).find(|id| {
            matches!(
                self.part(id).map(|p| &p.membership),
                Some(Membership::Exclusive { default: true, .. })
            )
        })
    }

    /// Check that `part` is a member of exclusive group `group`.
    pub fn require_member(&self, group: &str, part: &str) -> Result<&PartSpec> {
        if !self.has_group(group) {
            return Err(LoaderError::InvalidGroupState {
                group: group.to_string(),
                reason: "no such exclusive group".to_string(),
            });
        }
        let spec = self.require_part(part)?;
        if spec.group() != Some(group) {
            return Err(LoaderError::InvalidGroupState {
                group: group.to_string(),
                reason: format!("{} is not a member of this group", part),
            });
        }
        Ok(spec)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Builder that validates the catalog on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct PartCatalogBuilder {
    parts: Vec<PartSpec>,
}

impl PartCatalogBuilder {
    pub fn part(mut self, spec: PartSpec) -> Self {
        self.parts.push(spec);
        self
    }

    pub fn build(self) -> Result<PartCatalog> {
        let mut index = HashMap::new();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (i, spec) in self.parts.iter().enumerate() {
            if spec.id.is_empty() {
                return Err(LoaderError::Config("part with empty id".to_string()));
            }
            if spec.locator.trim().is_empty() {
                return Err(LoaderError::Config(format!("part {} has an empty locator", spec.id)));
            }
            if index.insert(spec.id.clone(), i).is_some() {
                return Err(LoaderError::Config(format!("duplicate part id: {}", spec.id)));
            }
            if let Membership::Exclusive { group, .. } = &spec.membership {
                if group.is_empty() {
                    return Err(LoaderError::Config(format!("part {} has an empty group", spec.id)));
                }
                groups.entry(group.clone()).or_default().push(spec.id.clone());
            }
        }

        for (group, members) in &groups {
            if index.contains_key(group) {
                return Err(LoaderError::Config(format!(
                    "group {} collides with a part id",
                    group
                )));
            }
            let defaults = members
                .iter()
                .filter(|id| {
                    matches!(
                        self.parts[index[*id]].membership,
                        Membership::Exclusive { default: true, .. }
                    )
                })
                .count();
            if defaults > 1 {
                return Err(LoaderError::Config(format!(
                    "group {} has {} default members, at most one allowed",
                    group, defaults
                )));
            }
        }

        Ok(PartCatalog { parts: self.parts, index, groups })
    }
}

// ============================================================================
// TOML Manifest
// ============================================================================

/// TOML form of the catalog.
///
/// ```toml
/// [[parts]]
/// id = "roof1"
/// locator = "models/roof1.glb"
/// group = "roof"
/// default = true
/// name = "Flat roof"
///
/// [[parts]]
/// id = "floor"
/// locator = "models/floor.glb"
/// visible = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogManifest {
    #[serde(default)]
    pub parts: Vec<PartEntry>,
}

/// One `[[parts]]` table of the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartEntry {
    pub id: String,
    pub locator: String,
    /// Exclusive group; omit for independent parts
    #[serde(default)]
    pub group: Option<String>,
    /// Default member of `group`
    #[serde(default)]
    pub default: bool,
    /// Independent part visible by default
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub placement: Placement,
}

impl CatalogManifest {
    pub fn into_catalog(self) -> Result<PartCatalog> {
        let mut builder = PartCatalog::builder();
        for entry in self.parts {
            let mut spec = match &entry.group {
                Some(group) => {
                    if entry.visible {
                        return Err(LoaderError::Config(format!(
                            "part {} is in group {}; `visible` only applies to independent parts",
                            entry.id, group
                        )));
                    }
                    PartSpec::exclusive(&entry.id, group, &entry.locator)
                }
                None => {
                    if entry.default {
                        return Err(LoaderError::Config(format!(
                            "part {} has no group; `default` only applies to group members",
                            entry.id
                        )));
                    }
                    PartSpec::independent(&entry.id, &entry.locator)
                }
            };
            if entry.default || entry.visible {
                spec = spec.by_default();
            }
            if let Some(name) = entry.name {
                spec = spec.named(name);
            }
            builder = builder.part(spec.with_placement(entry.placement));
        }
        builder.build()
    }
}
