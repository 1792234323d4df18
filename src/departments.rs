use serde::Serialize;

/// The four northern Córdoba departments the dashboard highlights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TargetDepartment {
    Totoral,
    Colon,
    Ischilin,
    Tulumba,
}

impl TargetDepartment {
    pub const ALL: [TargetDepartment; 4] = [
        TargetDepartment::Totoral,
        TargetDepartment::Colon,
        TargetDepartment::Ischilin,
        TargetDepartment::Tulumba,
    ];

    /// Exact match against the source spelling; case and accents matter.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    pub const fn name(self) -> &'static str {
        match self {
            TargetDepartment::Totoral => "TOTORAL",
            TargetDepartment::Colon => "COLÓN",
            TargetDepartment::Ischilin => "ISCHILÍN",
            TargetDepartment::Tulumba => "TULUMBA",
        }
    }

    /// Translucent RGBA fill for the polygon layer.
    pub const fn fill_color(self) -> [u8; 4] {
        match self {
            TargetDepartment::Totoral => [255, 0, 0, 12],
            TargetDepartment::Colon => [0, 255, 0, 12],
            TargetDepartment::Ischilin => [0, 0, 255, 12],
            TargetDepartment::Tulumba => [255, 165, 0, 12],
        }
    }
}

/// Fill for any department name; names outside the table get none.
pub fn fill_color_for(name: &str) -> Option<[u8; 4]> {
    TargetDepartment::from_name(name).map(TargetDepartment::fill_color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for d in TargetDepartment::ALL {
            assert_eq!(TargetDepartment::from_name(d.name()), Some(d));
        }
    }

    #[test]
    fn accents_and_case_matter() {
        assert_eq!(TargetDepartment::from_name("COLON"), None);
        assert_eq!(TargetDepartment::from_name("ISCHILIN"), None);
        assert_eq!(TargetDepartment::from_name("Totoral"), None);
        assert_eq!(TargetDepartment::from_name("COLÓN"), Some(TargetDepartment::Colon));
    }

    #[test]
    fn unknown_names_have_no_fill() {
        assert_eq!(fill_color_for("CAPITAL"), None);
        assert_eq!(fill_color_for("TULUMBA"), Some([255, 165, 0, 12]));
    }
}
