//! Extracting the hunks of a patch that touch a line range

use regex::Regex;

use crate::blame::normalize_file_path;

/// Keep only the hunks of `full_patch` for `file_path` whose new-file
/// range overlaps `[start_line, end_line]`. The file header is
/// preserved for the first kept hunk; the output is a valid patch
/// substring.
pub fn extract_relevant_patch(
    full_patch: &str,
    file_path: &str,
    start_line: u32,
    end_line: u32,
    repo_name: Option<&str>,
) -> String {
    if full_patch.is_empty() || file_path.is_empty() {
        return String::new();
    }

    let hunk_header = Regex::new(r"@@ -(\d+),?(\d*) \+(\d+),?(\d*) @@").expect("static pattern");
    let clean_path = normalize_file_path(file_path, repo_name);

    let lines: Vec<&str> = full_patch.lines().collect();
    let mut kept: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut file_header: Vec<&str> = Vec::new();
    let mut in_target_file = false;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];

        if line.starts_with("diff --git") {
            if in_target_file && !current.is_empty() {
                kept.push(current.join("\n"));
            }
            current = Vec::new();
            file_header = Vec::new();

            in_target_file = diff_header_matches(line, &clean_path);
            if in_target_file {
                file_header.push(line);
                // Capture index/mode lines up to the first hunk.
                let mut j = i + 1;
                while j < lines.len() && !lines[j].starts_with("@@") {
                    if lines[j].starts_with("index ")
                        || lines[j].starts_with("---")
                        || lines[j].starts_with("+++")
                        || lines[j].starts_with("new file")
                        || lines[j].starts_with("deleted file")
                    {
                        file_header.push(lines[j]);
                    }
                    j += 1;
                }
                i = j;
                continue;
            }
        } else if line.starts_with("@@") && in_target_file {
            let relevant = hunk_header.captures(line).is_some_and(|captures| {
                let new_start: u32 = captures
                    .get(3)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(0);
                let new_count: u32 = captures
                    .get(4)
                    .map(|m| m.as_str())
                    .filter(|s| !s.is_empty())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1);
                let new_end = new_start + new_count.saturating_sub(1);
                !(new_end < start_line || new_start > end_line)
            });

            let mut j = i + 1;
            while j < lines.len()
                && !lines[j].starts_with("@@")
                && !lines[j].starts_with("diff --git")
            {
                j += 1;
            }

            if relevant {
                if !file_header.is_empty() {
                    // Header goes in front of the first kept hunk only.
                    current.extend(file_header.drain(..));
                }
                current.push(line);
                current.extend(&lines[i + 1..j]);
            }
            i = j;
            continue;
        }

        i += 1;
    }

    if in_target_file && !current.is_empty() {
        kept.push(current.join("\n"));
    }

    kept.join("\n")
}

/// Match the `diff --git a/path b/path` header against the target file.
fn diff_header_matches(line: &str, clean_path: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return false;
    }
    let file_a = parts[2].strip_prefix("a/").unwrap_or(parts[2]);
    let file_b = parts[3].strip_prefix("b/").unwrap_or(parts[3]);

    clean_path.contains(file_a)
        || clean_path.contains(file_b)
        || file_a.contains(clean_path)
        || file_b.contains(clean_path)
}
