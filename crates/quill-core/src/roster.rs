use serde::{Deserialize, Serialize};

/// Canonical form of a student id: trimmed and lower-cased.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

/// Case-insensitive student id comparison.
pub fn same_id(a: &str, b: &str) -> bool {
    normalize_id(a) == normalize_id(b)
}

/// An enrolled student as listed in the roster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl Student {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn key(&self) -> String {
        normalize_id(&self.id)
    }
}

/// One side of a declared pairing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingMember {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<&Student> for PairingMember {
    fn from(s: &Student) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
        }
    }
}

/// Admin-declared pairing. Symmetric: either side may be queried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterPairing {
    pub primary: PairingMember,
    pub partner: PairingMember,
}

impl RosterPairing {
    pub fn new(primary: PairingMember, partner: PairingMember) -> Self {
        Self { primary, partner }
    }

    pub fn involves(&self, student_id: &str) -> bool {
        same_id(&self.primary.id, student_id) || same_id(&self.partner.id, student_id)
    }

    /// The member on the opposite side from `student_id`.
    pub fn counterpart_of(&self, student_id: &str) -> Option<&PairingMember> {
        if same_id(&self.primary.id, student_id) {
            Some(&self.partner)
        } else if same_id(&self.partner.id, student_id) {
            Some(&self.primary)
        } else {
            None
        }
    }
}

/// Full roster as returned by the roster source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub pairings: Vec<RosterPairing>,
}

impl Roster {
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn find_student(&self, id: &str) -> Option<&Student> {
        let key = normalize_id(id);
        self.students.iter().find(|s| s.key() == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, name: &str) -> PairingMember {
        PairingMember {
            id: id.into(),
            name: name.into(),
        }
    }

    #[test]
    fn ids_compare_case_insensitively() {
        assert!(same_id(" A1 ", "a1"));
        assert!(!same_id("a1", "a2"));
    }

    #[test]
    fn counterpart_from_either_side() {
        let pairing = RosterPairing::new(member("A1", "Alice"), member("A2", "Bob"));
        assert_eq!(pairing.counterpart_of("a1").unwrap().name, "Bob");
        assert_eq!(pairing.counterpart_of("A2").unwrap().name, "Alice");
        assert!(pairing.counterpart_of("A3").is_none());
        assert!(pairing.involves("a2"));
    }

    #[test]
    fn find_student_ignores_case_and_whitespace() {
        let roster = Roster {
            students: vec![Student::new("S-10", "Dana")],
            pairings: vec![],
        };
        assert_eq!(roster.find_student(" s-10").unwrap().name, "Dana");
        assert!(roster.find_student("S-11").is_none());
    }

    #[test]
    fn roster_json_tolerates_missing_fields() {
        let roster: Roster = serde_json::from_str(r#"{"students":[{"id":"x"}]}"#).unwrap();
        assert_eq!(roster.students[0].name, "");
        assert!(roster.pairings.is_empty());
    }
}
