/// Canonicalize a device-reported path into the index's `path_key`
/// (§3 `Object.path_key`, §8 invariant 7): no `..`, no NUL, no
/// reserved device names, and idempotent under repeated application.
pub fn sanitize(p: &str) -> String {
    let mut s: String = p.chars().filter(|&c| c != '\0').collect();
    while s.contains("..") {
        s = s.replace("..", "_");
    }
    let parts: Vec<String> = s
        .split('/')
        .filter(|c| !c.is_empty())
        .map(sanitize_component)
        .collect();
    format!("/{}", parts.join("/"))
}

fn sanitize_component(c: &str) -> String {
    if is_reserved_name(c) {
        format!("_{c}")
    } else {
        c.to_string()
    }
}

fn is_reserved_name(c: &str) -> bool {
    let stem = c.split('.').next().unwrap_or(c).to_ascii_uppercase();
    match stem.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        _ => {
            (stem.len() == 4)
                && (stem.starts_with("COM") || stem.starts_with("LPT"))
                && stem.as_bytes()[3].is_ascii_digit()
        }
    }
}
