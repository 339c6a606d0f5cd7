//! Reloader specification validation.

use crate::core::ReloaderSpec;
use crate::error::ValidationError;
use std::collections::HashMap;
use std::path::PathBuf;

/// Trait for configuration validation.
///
/// Implemented by [`ReloaderSpec`] for the invariants of a single reloader, and by
/// `[ReloaderSpec]` for the invariants that span a whole orchestration run.
///
/// # Examples
///
/// ```rust
/// use reconfy::core::{ReloaderSpec, Validate};
///
/// # fn example() -> reconfy::error::Result<()> {
/// let a = ReloaderSpec::builder("/in/a.tmpl").with_output("/out/a.conf").build()?;
/// let b = ReloaderSpec::builder("/in/b.tmpl").with_output("/out/b.conf").build()?;
/// [a, b].as_slice().validate()?;
/// # Ok(())
/// # }
/// ```
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}

impl Validate for [ReloaderSpec] {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        for spec in self {
            if let Err(err) = spec.validate() {
                errors.push(err);
            }
        }

        let mut names: HashMap<&str, usize> = HashMap::new();
        for spec in self.iter().filter(|s| !s.name.is_empty()) {
            let seen = names.entry(spec.name.as_str()).or_default();
            *seen += 1;
            if *seen == 2 {
                errors.push(ValidationError::DuplicateName(spec.name.clone()));
            }
        }

        let outputs: Vec<(usize, &PathBuf, String)> = self
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.output.as_ref().map(|o| (i, o, s.label())))
            .collect();

        for (i, (_, output, owner)) in outputs.iter().enumerate() {
            for (_, other, other_owner) in &outputs[i + 1..] {
                if output == other {
                    errors.push(ValidationError::collision(
                        *output,
                        format!("output shared by reloaders {} and {}", owner, other_owner),
                    ));
                }
            }
        }

        for (index, spec) in self.iter().enumerate() {
            for (owner_index, output, owner) in &outputs {
                // Same-spec overlaps are reported by ReloaderSpec::validate.
                if *owner_index == index {
                    continue;
                }
                if spec.inputs.contains(*output) {
                    errors.push(ValidationError::collision(
                        *output,
                        format!("output of {} is an input of {}", owner, spec.label()),
                    ));
                }
                let output_dir = crate::core::spec::parent_dir(output);
                if spec.watch_dirs.contains(&output_dir) {
                    errors.push(ValidationError::collision(
                        output_dir,
                        format!(
                            "watched by {} but holds the output of {}",
                            spec.label(),
                            owner
                        ),
                    ));
                }
            }
        }

        match ValidationError::from_list(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
