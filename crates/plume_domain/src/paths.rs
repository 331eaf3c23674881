use std::path::{Path, PathBuf};

pub const PLUME_ROOT_ENV: &str = "PLUME_ROOT";

pub fn sqlite_path(plume_root: &Path) -> PathBuf {
    plume_root.join("plume.db")
}

pub fn knowledge_root(plume_root: &Path) -> PathBuf {
    plume_root.join("knowledge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_join_to_expected_subpaths() {
        let base = PathBuf::from("plume-root");
        assert_eq!(sqlite_path(&base), base.join("plume.db"));
        assert_eq!(knowledge_root(&base), base.join("knowledge"));
        assert_eq!(PLUME_ROOT_ENV, "PLUME_ROOT");
    }
}
