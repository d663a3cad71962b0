//! Re-imaging command lines.

/// Expand the rebuild template for one server into program and arguments.
///
/// The template is split on whitespace before substitution, so an image or
/// server name containing spaces stays a single argument.
pub fn rebuild_argv(template: &str, image: &str, server: &str) -> Option<(String, Vec<String>)> {
    let mut words = template
        .split_whitespace()
        .map(|w| w.replace("{image}", image).replace("{server}", server));
    let program = words.next()?;
    Some((program, words.collect()))
}
