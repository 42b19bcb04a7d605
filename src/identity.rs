/// De-duplication identity for a student row.
///
/// Upstream entry sometimes swaps the id and name columns, so a purely
/// numeric value is trusted as the id wherever it appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentIdentity {
    pub key: String,
    pub student_id: String,
    pub student_name: String,
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

pub fn resolve_student_identity(student_id: &str, student_name: &str) -> StudentIdentity {
    let id = student_id.trim();
    let name = student_name.trim();

    if is_numeric(id) {
        return StudentIdentity {
            key: id.to_string(),
            student_id: id.to_string(),
            student_name: name.to_string(),
        };
    }
    if is_numeric(name) {
        return StudentIdentity {
            key: name.to_string(),
            student_id: name.to_string(),
            student_name: id.to_string(),
        };
    }

    // Neither side is a usable id: key on the name, or the raw id if the name is blank.
    let key = if name.is_empty() { id } else { name };
    StudentIdentity {
        key: key.to_string(),
        student_id: id.to_string(),
        student_name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_id_is_authoritative() {
        let ident = resolve_student_identity("20231001", "Sara Ali");
        assert_eq!(ident.key, "20231001");
        assert_eq!(ident.student_id, "20231001");
        assert_eq!(ident.student_name, "Sara Ali");
    }

    #[test]
    fn swapped_columns_are_repaired() {
        let ident = resolve_student_identity("Sara Ali", "20231001");
        assert_eq!(ident.key, "20231001");
        assert_eq!(ident.student_id, "20231001");
        assert_eq!(ident.student_name, "Sara Ali");
    }

    #[test]
    fn non_numeric_falls_back_to_name() {
        let ident = resolve_student_identity("S-17", "Omar");
        assert_eq!(ident.key, "Omar");
        assert_eq!(ident.student_id, "S-17");

        let blank_name = resolve_student_identity("S-17", "  ");
        assert_eq!(blank_name.key, "S-17");
    }
}
