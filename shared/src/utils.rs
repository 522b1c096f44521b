//! Small helpers shared by more than one module.

use crate::NightWatchError;

/// Rejects a caller-supplied task-file name that would escape the
/// tasks directory (absolute paths, `..` components, separators).
/// Used wherever a filename arrives over the Control API rather than
/// from the trusted on-disk task loader itself.
pub fn sanitize_filename(name: &str) -> crate::Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(NightWatchError::ConfigurationInvalid(format!(
            "\"{name}\" is not a valid task file name"
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(sanitize_filename("tasks.yml").is_ok());
        assert!(sanitize_filename("web-checks.yaml").is_ok());
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        assert!(sanitize_filename("../escape.yml").is_err());
        assert!(sanitize_filename("/etc/passwd").is_err());
        assert!(sanitize_filename("sub/dir.yml").is_err());
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename(".hidden.yml").is_err());
    }
}
