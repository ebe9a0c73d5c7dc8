use crate::Tessera;

/// Splits the body of a test into multiple templates.
/// The format is:
/// $$ filename
/// body
/// $$ other filename
/// other body
pub fn split_multi_templates(body: &str) -> Vec<(String, String)> {
    let parts: Vec<_> = body.split("$$ ").skip(1).collect();
    let mut tpls = Vec::with_capacity(parts.len());
    for part in parts {
        let mut chars = part.chars();
        let filename: String = chars.by_ref().take_while(|&c| c != '\n').collect();
        let content = chars.collect::<String>().trim().to_string();
        tpls.push((filename, content));
    }
    tpls
}

/// Converts Windows CRLF line endings to LF so the snapshots are the same everywhere.
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

/// Adds every template of the body to a new instance and returns it along with the
/// name of the last template.
/// To be used when the templates are valid only
pub fn create_multi_templates(body: &str) -> (Tessera, String) {
    let normalized_body = normalize_line_endings(body);
    let tpls = split_multi_templates(&normalized_body);
    let last_filename = tpls.last().unwrap().0.clone();
    let mut env = Tessera::default();
    env.add_raw_templates(tpls).unwrap();

    (env, last_filename)
}
