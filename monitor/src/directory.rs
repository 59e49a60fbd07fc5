//! Directory of known projects.
//!
//! The directory owns the mapping between project names and their stable
//! [`Slot`]s. It is populated once per session, either by discovery through
//! the management endpoint or by seeding it with names from configuration.
//!
//! # Listing format
//!
//! The management endpoint answers with a loosely delimited text blob in
//! which every project appears as `<marker> <name>:`. The parser scans for
//! each marker occurrence, takes the text up to the next delimiter, and
//! accepts it as a name only if it is a single non-empty token that does not
//! itself contain the marker. Anything else is skipped and scanning resumes
//! after the marker, so one malformed entry never hides the ones after it.
//!
//! ```
//! use cctray_monitor::directory::parse_listing;
//!
//! let listing = parse_listing("... Project foo: ... Project bar: ...", "Project");
//! assert_eq!(listing.names, vec!["foo", "bar"]);
//! assert_eq!(listing.skipped, 0);
//! ```

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::management::{ManagementApi, ManagementError};
use crate::types::{Project, Slot};

/// Marker preceding every project entry in a listing.
pub const LISTING_MARKER: &str = "Project";

/// Delimiter terminating a project name in a listing.
pub const LISTING_DELIMITER: char = ':';

/// Characters that cannot appear in a listed project name.
const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', '=', '"', '&'];

/// Errors from directory lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// No project with this name is known.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    /// No project occupies this slot.
    #[error("unknown project slot: {0}")]
    UnknownSlot(Slot),
}

/// Result of parsing a listing blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Names in encounter order, without duplicates.
    pub names: Vec<String>,

    /// Marker occurrences that did not yield a name.
    pub skipped: usize,
}

/// Parses a management listing into project names.
#[must_use]
pub fn parse_listing(blob: &str, marker: &str) -> Listing {
    let mut listing = Listing::default();
    if marker.is_empty() {
        return listing;
    }

    for (position, _) in blob.match_indices(marker) {
        let rest = &blob[position + marker.len()..];
        let Some(end) = rest.find(LISTING_DELIMITER) else {
            listing.skipped += 1;
            debug!(offset = position, "Listing entry has no delimiter");
            continue;
        };

        let candidate = rest[..end].trim();
        if !is_valid_name(candidate, marker) {
            listing.skipped += 1;
            debug!(offset = position, candidate = %candidate, "Skipping malformed listing entry");
            continue;
        }

        if listing.names.iter().any(|n| n == candidate) {
            continue;
        }
        listing.names.push(candidate.to_string());
    }

    listing
}

fn is_valid_name(candidate: &str, marker: &str) -> bool {
    !candidate.is_empty()
        && !candidate.contains(marker)
        && !candidate.contains(char::is_whitespace)
        && !candidate.contains(FORBIDDEN_NAME_CHARS)
}

/// The set of known projects for this session.
#[derive(Debug, Clone, Default)]
pub struct ProjectDirectory {
    projects: Vec<Project>,
    by_name: HashMap<String, Slot>,
}

impl ProjectDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from names, assigning slots in order.
    ///
    /// Duplicate names keep their first slot.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut directory = Self::new();
        for name in names {
            directory.insert(name.into());
        }
        directory
    }

    /// Adds a project if it is not yet known and returns its slot.
    pub fn insert(&mut self, name: String) -> Slot {
        if let Some(slot) = self.by_name.get(&name) {
            return *slot;
        }
        let slot = Slot::new(self.projects.len());
        self.by_name.insert(name.clone(), slot);
        self.projects.push(Project { name, slot });
        slot
    }

    /// Populates the directory from the management endpoint.
    ///
    /// A no-op when the directory is already populated. A listing with no
    /// recognizable entries leaves the directory empty; the caller decides
    /// whether that disables remote management.
    ///
    /// # Errors
    ///
    /// Returns the `ManagementError` from the listing request.
    pub async fn discover(&mut self, api: &dyn ManagementApi) -> Result<&[Project], ManagementError> {
        if self.is_populated() {
            debug!(projects = self.len(), "Directory already populated, skipping discovery");
            return Ok(&self.projects);
        }

        let blob = api.project_listing().await?;
        let listing = parse_listing(&blob, LISTING_MARKER);

        if listing.skipped > 0 {
            warn!(skipped = listing.skipped, "Skipped malformed project listing entries");
        }

        for name in listing.names {
            self.insert(name);
        }

        info!(projects = self.len(), "Project discovery complete");
        Ok(&self.projects)
    }

    /// Drops every project so the next discovery starts over.
    pub fn clear(&mut self) {
        self.projects.clear();
        self.by_name.clear();
    }

    #[must_use]
    pub fn is_populated(&self) -> bool {
        !self.projects.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Projects in slot order.
    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Resolves a project name to its slot.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::UnknownProject` for names outside the directory.
    pub fn slot_of(&self, name: &str) -> Result<Slot, DirectoryError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| DirectoryError::UnknownProject(name.to_string()))
    }

    /// Resolves a slot to its project name.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryError::UnknownSlot` for slots outside the directory.
    pub fn name_of(&self, slot: Slot) -> Result<&str, DirectoryError> {
        self.projects
            .get(slot.position())
            .map(|p| p.name.as_str())
            .ok_or(DirectoryError::UnknownSlot(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_projects() {
        let listing = parse_listing("...Project foo: ... Project bar: ...", "Project");
        assert_eq!(listing.names, vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn test_malformed_entry_between_good_ones() {
        let blob = "Project foo: status Project <b>broken</b> Project bar: status";
        let listing = parse_listing(blob, "Project");
        assert_eq!(listing.names, vec!["foo".to_string(), "bar".to_string()]);
        assert_eq!(listing.skipped, 1);
    }

    #[test]
    fn test_entry_without_delimiter_is_skipped() {
        let listing = parse_listing("Project foo: Project dangling", "Project");
        assert_eq!(listing.names, vec!["foo".to_string()]);
        assert_eq!(listing.skipped, 1);
    }

    #[test]
    fn test_marker_never_found_yields_empty_listing() {
        let listing = parse_listing("<html>Service unavailable</html>", "Project");
        assert!(listing.names.is_empty());
        assert_eq!(listing.skipped, 0);
    }

    #[test]
    fn test_duplicate_names_listed_once() {
        let listing = parse_listing("Project foo: Project foo: Project bar:", "Project");
        assert_eq!(listing.names, vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn test_slots_assigned_in_order() {
        let directory = ProjectDirectory::from_names(["foo", "bar", "foo"]);
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.slot_of("foo").unwrap(), Slot::new(0));
        assert_eq!(directory.slot_of("bar").unwrap(), Slot::new(1));
        assert_eq!(directory.name_of(Slot::new(1)).unwrap(), "bar");
    }

    #[test]
    fn test_resolution_misses() {
        let directory = ProjectDirectory::from_names(["foo"]);
        assert_eq!(
            directory.slot_of("nope"),
            Err(DirectoryError::UnknownProject("nope".to_string()))
        );
        assert_eq!(
            directory.name_of(Slot::new(4)),
            Err(DirectoryError::UnknownSlot(Slot::new(4)))
        );
    }

    #[test]
    fn test_clear_empties_directory() {
        let mut directory = ProjectDirectory::from_names(["foo"]);
        assert!(directory.is_populated());
        directory.clear();
        assert!(directory.is_empty());
        assert!(directory.slot_of("foo").is_err());
    }
}
