// Dotted/bracketed path resolution against JSON documents

use serde_json::Value;

/// One step of a parsed attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("empty path")]
    Empty,
    #[error("malformed path near byte {0}")]
    Malformed(usize),
}

/// Resolve `path` (e.g. `emails[*].from`, `items[3].name.first`) against
/// `value`, returning every leaf the path reaches. `[*]` fans out over array
/// elements; a path that reaches nothing returns an empty list.
pub fn extract<'a>(value: &'a Value, path: &str) -> Result<Vec<&'a Value>, PathError> {
    let segments = parse_path(path)?;
    let mut current = vec![value];
    for segment in &segments {
        let mut next = Vec::new();
        for v in current {
            match segment {
                Segment::Field(name) => {
                    if let Some(child) = v.get(name.as_str()) {
                        next.push(child);
                    }
                }
                Segment::Index(i) => {
                    if let Some(child) = v.get(*i) {
                        next.push(child);
                    }
                }
                Segment::Wildcard => {
                    if let Some(items) = v.as_array() {
                        next.extend(items.iter());
                    }
                }
            }
        }
        current = next;
    }
    Ok(current)
}

/// Scalar lookup used for tool-argument names: dotted fields and explicit
/// indices only. A wildcard segment never resolves to a single value.
pub fn lookup_scalar<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path).ok()?;
    let mut current = value;
    for segment in &segments {
        current = match segment {
            Segment::Field(name) => current.get(name.as_str())?,
            Segment::Index(i) => current.get(*i)?,
            Segment::Wildcard => return None,
        };
    }
    Some(current)
}

fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    let bytes = path.as_bytes();
    let mut segments = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        match bytes[pos] {
            b'.' => {
                // A dot must separate two segments; it cannot lead.
                if pos == 0 {
                    return Err(PathError::Malformed(0));
                }
                pos += 1;
                let (field, next) = take_field(path, pos)?;
                segments.push(Segment::Field(field));
                pos = next;
            }
            b'[' => {
                let close = path[pos..]
                    .find(']')
                    .map(|i| pos + i)
                    .ok_or(PathError::Malformed(pos))?;
                let inner = &path[pos + 1..close];
                if inner == "*" {
                    segments.push(Segment::Wildcard);
                } else {
                    let index: usize =
                        inner.parse().map_err(|_| PathError::Malformed(pos))?;
                    segments.push(Segment::Index(index));
                }
                pos = close + 1;
            }
            _ => {
                if pos != 0 {
                    return Err(PathError::Malformed(pos));
                }
                let (field, next) = take_field(path, pos)?;
                segments.push(Segment::Field(field));
                pos = next;
            }
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }
    Ok(segments)
}

fn take_field(path: &str, start: usize) -> Result<(String, usize), PathError> {
    let rest = &path[start..];
    let end = rest
        .find(|c| c == '.' || c == '[')
        .map(|i| start + i)
        .unwrap_or(path.len());
    if end == start {
        return Err(PathError::Malformed(start));
    }
    Ok((path[start..end].to_string(), end))
}
