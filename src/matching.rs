use crate::error::{ClockodoError, EntityKind};
use crate::models::{Customer, Project, Service};

const SUGGESTION_LIMIT: usize = 5;

pub trait Named {
    fn id(&self) -> u64;
    fn name(&self) -> &str;
    fn active(&self) -> bool;
}

impl Named for Customer {
    fn id(&self) -> u64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn active(&self) -> bool {
        self.active
    }
}

impl Named for Project {
    fn id(&self) -> u64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn active(&self) -> bool {
        self.active
    }
}

impl Named for Service {
    fn id(&self) -> u64 {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn active(&self) -> bool {
        self.active
    }
}

/// A successful lookup: the remote ID plus the name as Clockodo spells it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub id: u64,
    pub name: String,
}

pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone)]
struct Candidate {
    id: u64,
    name: String,
    normalized: String,
    active: bool,
}

impl Candidate {
    fn resolved(&self) -> Resolved {
        Resolved {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Name lookup table built from one listing.
///
/// Queries are matched in three passes: exact, prefix, substring (all on
/// trimmed lowercase names). The first pass producing any candidate decides
/// the outcome. Several candidates in that pass are always ambiguous, active
/// or not.
#[derive(Debug, Clone)]
pub struct NameIndex {
    kind: EntityKind,
    candidates: Vec<Candidate>,
}

impl NameIndex {
    pub fn new<'a, T, I>(kind: EntityKind, items: I) -> Self
    where
        T: Named + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let candidates = items
            .into_iter()
            .map(|item| Candidate {
                id: item.id(),
                name: item.name().to_string(),
                normalized: normalize(item.name()),
                active: item.active(),
            })
            .collect();
        Self { kind, candidates }
    }

    pub fn lookup(&self, query: &str) -> Result<Resolved, ClockodoError> {
        let needle = normalize(query);
        if needle.is_empty() {
            return Err(ClockodoError::validation(format!("{} name must not be empty", self.kind)));
        }

        let passes: [fn(&str, &str) -> bool; 3] = [
            |name, needle| name == needle,
            |name, needle| name.starts_with(needle),
            |name, needle| name.contains(needle),
        ];

        for pass in passes {
            let found: Vec<&Candidate> = self
                .candidates
                .iter()
                .filter(|candidate| pass(&candidate.normalized, &needle))
                .collect();
            match found.as_slice() {
                [] => continue,
                [only] => return Ok(only.resolved()),
                several => {
                    return Err(ClockodoError::AmbiguousMatch {
                        kind: self.kind,
                        query: query.trim().to_string(),
                        candidates: several.iter().map(|candidate| candidate.name.clone()).collect(),
                    });
                }
            }
        }

        let available: Vec<&str> = self
            .candidates
            .iter()
            .filter(|candidate| candidate.active)
            .take(SUGGESTION_LIMIT)
            .map(|candidate| candidate.name.as_str())
            .collect();
        Err(ClockodoError::not_found(self.kind, query.trim(), &available))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn customer(id: u64, name: &str, active: bool) -> Customer {
        Customer {
            id,
            name: name.to_string(),
            active,
        }
    }

    fn index(customers: &[Customer]) -> NameIndex {
        NameIndex::new(EntityKind::Customer, customers)
    }

    #[test]
    fn exact_match_ignores_case() {
        let customers = vec![customer(1, "Acme", true)];
        assert_eq!(index(&customers).lookup("acme").unwrap().id, 1);
        assert_eq!(index(&customers).lookup("  ACME ").unwrap().id, 1);
    }

    #[test]
    fn exact_match_beats_prefix_match() {
        let customers = vec![customer(1, "Acme Holding", true), customer(2, "Acme", true)];
        assert_eq!(index(&customers).lookup("acme").unwrap().id, 2);
    }

    #[test]
    fn unique_prefix_resolves() {
        let customers = vec![customer(1, "Globex Corporation", true), customer(2, "Initech", true)];
        assert_eq!(index(&customers).lookup("glob").unwrap().id, 1);
    }

    #[test]
    fn substring_is_the_last_resort() {
        let customers = vec![customer(1, "Big Acme Ltd", true), customer(2, "Initech", true)];
        assert_eq!(index(&customers).lookup("acme").unwrap().id, 1);
    }

    #[test]
    fn several_prefix_matches_are_ambiguous() {
        let customers = vec![customer(1, "Webshop", true), customer(2, "Website", true)];
        let err = index(&customers).lookup("web").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
        assert!(err.to_string().contains("Webshop"));
        assert!(err.to_string().contains("Website"));
    }

    #[test]
    fn inactive_candidates_still_make_a_match_ambiguous() {
        let customers = vec![customer(1, "Webshop", false), customer(2, "Website", true)];
        let err = index(&customers).lookup("web").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);

        let duplicates = vec![customer(1, "Acme", false), customer(2, "acme", true)];
        let err = index(&duplicates).lookup("Acme").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);
    }

    #[test]
    fn no_match_is_not_found_with_suggestions() {
        let customers = vec![customer(1, "Acme", true), customer(2, "Initech", false)];
        let err = index(&customers).lookup("Umbrella").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "Customer 'Umbrella' not found. Available: Acme");
    }

    #[test]
    fn blank_query_is_rejected() {
        let customers = vec![customer(1, "Acme", true)];
        let err = index(&customers).lookup("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }
}
