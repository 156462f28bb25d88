use std::path::{Component, Path, PathBuf};

/// Renders paths for logs and error messages.
///
/// Prefers the canonical path; when the path does not exist (yet) it falls
/// back to an absolute, lexically normalized form.
pub trait BestEffortPathExt {
    fn best_effort_path_display(&self) -> String;
}

impl<P: AsRef<Path> + ?Sized> BestEffortPathExt for P {
    fn best_effort_path_display(&self) -> String {
        let path = self.as_ref();
        if let Ok(canonical) = path.canonicalize() {
            return canonical.display().to_string();
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|current_dir| current_dir.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        normalize(&absolute).display().to_string()
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .fold(Vec::new(), |mut components, component| {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !matches!(components.last(), None | Some(Component::RootDir)) {
                        components.pop();
                    }
                }
                _ => components.push(component),
            }
            components
        })
        .iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use tempfile::TempDir;

    #[rstest]
    #[case("/does/not/exist/input.json", "/does/not/exist/input.json")]
    #[case("/does/./not/../exist.json", "/does/exist.json")]
    #[case("/../escape.json", "/escape.json")]
    fn missing_absolute_paths_are_normalized(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(path.best_effort_path_display(), expected);
    }

    #[test]
    fn missing_relative_paths_become_absolute() {
        let display = "definitely-missing-document.json".best_effort_path_display();

        assert!(Path::new(&display).is_absolute());
        assert!(display.ends_with("definitely-missing-document.json"));
    }

    #[test]
    fn existing_paths_are_canonicalized() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let indirect = temp_dir.path().join(".").join("input.json");
        std::fs::write(&indirect, "[]").expect("Failed to write temp file");

        let display = indirect.best_effort_path_display();

        assert!(!display.contains("/./"));
        assert!(display.ends_with("input.json"));
    }
}
