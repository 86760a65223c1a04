//! Line marking for unified diffs stored on overlay nodes

const RM_MARK: &str = "[RM] ";
const ADD_MARK: &str = "[ADD] ";

/// Mark the body lines of a unified diff: removed lines get an `[RM] `
/// prefix, added lines an `[ADD] ` prefix, context lines and hunk/file
/// headers are preserved verbatim. Applying the marker to its own output
/// is a no-op.
pub fn mark_diff_lines(diff: &str) -> String {
    let mut out = Vec::new();
    for line in diff.lines() {
        if line.starts_with(RM_MARK) || line.starts_with(ADD_MARK) {
            // Already marked.
            out.push(line.to_string());
        } else if line.starts_with("---") || line.starts_with("+++") {
            // File headers, not diff body.
            out.push(line.to_string());
        } else if line.starts_with('-') {
            out.push(format!("{RM_MARK}{line}"));
        } else if line.starts_with('+') {
            out.push(format!("{ADD_MARK}{line}"));
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}
