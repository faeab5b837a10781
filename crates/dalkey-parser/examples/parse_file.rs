//! Parse a file (or a built-in snippet) and dump the tree and diagnostics.
//!
//! Usage: `cargo run --example parse_file [path/to/source.js]`

use std::env;
use std::fs;

use dalkey_parser::{parse_file, FileSet, Mode};

const DEMO: &str = r#"
function greet(name) {
    if (!name) {
        name = 'world';
    }
    return 'hello, ' + name;
}

var messages = [];
for (var i = 0; i < 3; i++) {
    messages[i] = greet(i % 2 ? null : 'dalkey');
}
"#;

fn main() {
    let (name, source) = match env::args().nth(1) {
        Some(path) => {
            let source = fs::read_to_string(&path).expect("read source file");
            (path, source)
        }
        None => ("demo.js".to_string(), DEMO.to_string()),
    };

    let mut files = FileSet::new();
    let (program, errors) = parse_file(Some(&mut files), &name, &source, Mode::default());

    println!(
        "{}: {} top-level statements, {} hoisted declarations",
        name,
        program.body.len(),
        program.declarations.len()
    );
    for error in &errors {
        println!("error: {error}");
    }
    println!("{program:#?}");
}
