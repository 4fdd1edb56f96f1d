//! Purpose: Map design-document names between their logical and stored (physical) forms.
//! Exports: `DesignDocumentNamespace`, `physical_name`, `logical_name`, `namespace_of`, `storage_id_to_physical`.
//! Role: Pure helpers used by the view index manager on every request and response.
//! Invariants: `physical_name` is idempotent for a fixed namespace.
//! Invariants: `logical_name` strips the development marker regardless of namespace.

pub const DEV_PREFIX: &str = "dev_";
pub const DESIGN_ID_PREFIX: &str = "_design/";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DesignDocumentNamespace {
    Development,
    Production,
}

impl DesignDocumentNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            DesignDocumentNamespace::Development => "development",
            DesignDocumentNamespace::Production => "production",
        }
    }
}

pub fn physical_name(logical: &str, namespace: DesignDocumentNamespace) -> String {
    match namespace {
        DesignDocumentNamespace::Production => strip_markers(logical).to_string(),
        DesignDocumentNamespace::Development if logical.starts_with(DEV_PREFIX) => {
            logical.to_string()
        }
        DesignDocumentNamespace::Development => format!("{DEV_PREFIX}{logical}"),
    }
}

pub fn logical_name(physical: &str) -> String {
    strip_markers(physical).to_string()
}

pub fn namespace_of(physical: &str) -> DesignDocumentNamespace {
    if physical.starts_with(DEV_PREFIX) {
        DesignDocumentNamespace::Development
    } else {
        DesignDocumentNamespace::Production
    }
}

/// Storage ids look like `_design/<physical>`; ids without the prefix are taken as-is.
pub fn storage_id_to_physical(id: &str) -> &str {
    id.strip_prefix(DESIGN_ID_PREFIX).unwrap_or(id)
}

fn strip_markers(mut name: &str) -> &str {
    while let Some(rest) = name.strip_prefix(DEV_PREFIX) {
        name = rest;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::{
        DesignDocumentNamespace, logical_name, namespace_of, physical_name, storage_id_to_physical,
    };

    const NAMES: [&str; 6] = ["idx", "dev_idx", "dev_dev_idx", "devices", "d", ""];
    const NAMESPACES: [DesignDocumentNamespace; 2] = [
        DesignDocumentNamespace::Development,
        DesignDocumentNamespace::Production,
    ];

    #[test]
    fn development_adds_marker_once() {
        assert_eq!(
            physical_name("idx", DesignDocumentNamespace::Development),
            "dev_idx"
        );
        assert_eq!(
            physical_name("dev_idx", DesignDocumentNamespace::Development),
            "dev_idx"
        );
    }

    #[test]
    fn production_strips_marker() {
        assert_eq!(
            physical_name("dev_idx", DesignDocumentNamespace::Production),
            "idx"
        );
        assert_eq!(
            physical_name("idx", DesignDocumentNamespace::Production),
            "idx"
        );
    }

    #[test]
    fn names_sharing_marker_letters_are_untouched() {
        assert_eq!(
            physical_name("devices", DesignDocumentNamespace::Production),
            "devices"
        );
        assert_eq!(logical_name("dev_devices"), "devices");
    }

    #[test]
    fn physical_name_is_idempotent() {
        for name in NAMES {
            for namespace in NAMESPACES {
                let once = physical_name(name, namespace);
                assert_eq!(physical_name(&once, namespace), once, "{name} {namespace:?}");
            }
        }
    }

    #[test]
    fn logical_name_inverts_physical_name() {
        for name in ["idx", "devices", "by_type", ""] {
            for namespace in NAMESPACES {
                assert_eq!(logical_name(&physical_name(name, namespace)), name);
            }
        }
    }

    #[test]
    fn namespace_follows_marker() {
        assert_eq!(namespace_of("dev_idx"), DesignDocumentNamespace::Development);
        assert_eq!(namespace_of("idx"), DesignDocumentNamespace::Production);
    }

    #[test]
    fn storage_id_prefix_is_stripped() {
        assert_eq!(storage_id_to_physical("_design/dev_idx"), "dev_idx");
        assert_eq!(storage_id_to_physical("idx"), "idx");
    }
}
