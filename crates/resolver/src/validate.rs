//! Identifier validation and normalization
//!
//! Requests are validated up front; the pipeline itself assumes clean
//! input. The character set covers linear SMILES notation; the length cap
//! keeps a hostile request from tying up the inference engine.

/// Longest identifier accepted anywhere in the service.
pub const MAX_IDENTIFIER_LENGTH: usize = 1000;

/// Canonical key form used for cache and lookup keys.
pub fn normalize(identifier: &str) -> String {
    identifier.trim().to_string()
}

/// Validate an identifier, returning a human-readable rejection reason.
pub fn validate_identifier(identifier: &str) -> Result<(), String> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err("identifier must be a non-empty string".into());
    }
    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(format!(
            "identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
        ));
    }
    if let Some(c) = identifier.chars().find(|c| !is_smiles_char(*c)) {
        return Err(format!("identifier contains invalid character {c:?}"));
    }
    if !brackets_balanced(identifier) {
        return Err("identifier has unbalanced brackets".into());
    }
    Ok(())
}

fn is_smiles_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '(' | ')' | '[' | ']' | '{' | '}' | '@' | '+' | '-' | '=' | '#' | '$' | '%' | ':'
                | ';' | '.' | ','
        )
}

fn brackets_balanced(identifier: &str) -> bool {
    let mut stack = Vec::new();
    for c in identifier.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}
