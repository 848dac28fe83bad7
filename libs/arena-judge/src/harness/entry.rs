//! Entry-point discovery.
//!
//! Submissions are expected to define `solution` (or `solve`). When neither
//! exists the generator falls back to a line-based scan for the first
//! top-level function. The scan is a heuristic: it reads lines without
//! indentation only, knows nothing about comments or strings, and may pick a
//! helper instead of the intended function. Callers must not rely on which
//! function it finds beyond "the first one it recognised".

/// Names tried before the heuristic scan, in order
pub const PREFERRED_NAMES: &[&str] = &["solution", "solve"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// JavaScript and TypeScript
    Script,
    Python,
}

/// Top-level function names declared in `source`, in order of appearance
pub fn declared_functions(source: &str, syntax: Syntax) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let found = match syntax {
            Syntax::Script => script_declaration(line),
            Syntax::Python => python_declaration(line),
        };
        if let Some(name) = found {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// The single function a statically checked harness should call
///
/// Preferred names win over the heuristic pick.
pub fn find_entry_point(source: &str, syntax: Syntax) -> Option<String> {
    let declared = declared_functions(source, syntax);
    PREFERRED_NAMES
        .iter()
        .find(|name| declared.iter().any(|d| d == *name))
        .map(|name| name.to_string())
        .or_else(|| declared.into_iter().next())
}

/// Names a dynamically checked harness should look up at runtime, in order
///
/// Always starts with the preferred names; the heuristic pick is appended
/// when it is something else.
pub fn runtime_candidates(source: &str, syntax: Syntax) -> Vec<String> {
    let mut candidates: Vec<String> = PREFERRED_NAMES.iter().map(|n| n.to_string()).collect();
    if let Some(first) = declared_functions(source, syntax).into_iter().next() {
        if !candidates.contains(&first) {
            candidates.push(first);
        }
    }
    candidates
}

fn script_declaration(line: &str) -> Option<String> {
    let mut rest = line.trim_end();
    for prefix in ["export default ", "export "] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    if let Some(stripped) = rest.strip_prefix("async ") {
        rest = stripped.trim_start();
    }

    if let Some(after) = rest.strip_prefix("function") {
        if !after.starts_with(|c: char| c.is_whitespace() || c == '*') {
            return None;
        }
        return identifier(after.trim_start_matches(|c: char| c.is_whitespace() || c == '*'));
    }

    for keyword in ["const ", "let ", "var "] {
        if let Some(after) = rest.strip_prefix(keyword) {
            let name = identifier(after.trim_start())?;
            let (_, value) = after.split_once('=')?;
            let value = value.trim_start();
            let is_function = value.starts_with("function")
                || value.starts_with("async")
                || value.contains("=>");
            return is_function.then_some(name);
        }
    }
    None
}

fn python_declaration(line: &str) -> Option<String> {
    let rest = line.strip_prefix("async ").unwrap_or(line);
    let after = rest.strip_prefix("def ")?;
    let name = identifier(after.trim_start())?;
    // names starting with an underscore are private helpers by convention
    (!name.starts_with('_')).then_some(name)
}

fn identifier(text: &str) -> Option<String> {
    let name: String = text
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    match name.chars().next() {
        Some(first) if !first.is_ascii_digit() => Some(name),
        _ => None,
    }
}
