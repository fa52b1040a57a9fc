use std::fs;

/// Writes the OpenAPI document to the path given as the first argument,
/// or to stdout when no path is given.
fn main() -> anyhow::Result<()> {
    let doc = warden::docs::build_openapi(8000)?;
    let json = serde_json::to_string_pretty(&doc)?;

    match std::env::args().nth(1) {
        Some(path) => {
            fs::write(&path, json)?;
            eprintln!("wrote {}", path);
        }
        None => println!("{json}"),
    }
    Ok(())
}
