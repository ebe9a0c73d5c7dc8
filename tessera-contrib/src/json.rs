use tessera::{Args, Error, TesseraResult, Value};

/// Outputs the value as JSON in a `<script type="application/json">` tag, with the
/// characters that could close the tag escaped. The argument is the element id.
///
/// ```text
/// {{ value|json_script:"hello-data" }}
/// ```
pub fn json_script(val: Value, args: Args) -> TesseraResult<Value> {
    let json = serde_json::to_string(&val)
        .map_err(|e| Error::chain("Error encoding to JSON", e))?
        .replace('&', "\\u0026")
        .replace('<', "\\u003C")
        .replace('>', "\\u003E");

    let out = match args.get::<String>(0)? {
        Some(id) if !id.is_empty() => {
            let mut escaped = Vec::with_capacity(id.len());
            tessera::escape_html(id.as_bytes(), &mut escaped)?;
            format!(
                r#"<script id="{}" type="application/json">{json}</script>"#,
                String::from_utf8_lossy(&escaped)
            )
        }
        _ => format!(r#"<script type="application/json">{json}</script>"#),
    };
    Ok(Value::safe_string(&out))
}
