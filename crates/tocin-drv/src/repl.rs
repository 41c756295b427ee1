//! Interactive shell (`tocin -r`).
//!
//! A thin loop over the core pipeline: each submitted snippet is lexed,
//! parsed, and analyzed in the running session; diagnostics print
//! immediately, and clean expressions report their type. A snippet
//! ending in `:` keeps reading indented lines until a blank line, so
//! multi-line definitions work.

use std::io::{BufRead, Write};

use tocin_lex::Lexer;
use tocin_par::Parser;
use tocin_sem::{Analyzer, FeatureToggles};
use tocin_util::{Handler, SourceMap, Symbol};

use crate::Cli;

pub fn run(cli: &Cli) -> anyhow::Result<i32> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let toggles = FeatureToggles {
        allow_async: !cli.no_async,
        allow_concurrency: !cli.no_concurrency,
        allow_advanced: !cli.no_advanced,
    };

    println!("tocin repl - :quit to exit");
    let mut lines = stdin.lock().lines();
    let mut counter = 0usize;

    loop {
        print!("tocin> ");
        stdout.flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let trimmed = line.trim();
        if trimmed == ":quit" || trimmed == ":q" {
            break;
        }
        if trimmed.is_empty() {
            continue;
        }

        // Block openers keep reading until a blank line.
        let mut snippet = line.clone();
        snippet.push('\n');
        if line.trim_end().ends_with(':') {
            loop {
                print!("  ...> ");
                stdout.flush()?;
                let Some(next) = lines.next() else { break };
                let next = next?;
                if next.trim().is_empty() {
                    break;
                }
                snippet.push_str(&next);
                snippet.push('\n');
            }
        }

        counter += 1;
        evaluate(&snippet, counter, toggles);
    }
    Ok(0)
}

fn evaluate(snippet: &str, counter: usize, toggles: FeatureToggles) {
    let mut sources = SourceMap::new();
    let handler = Handler::new();
    let name = format!("repl:{counter}");
    let file = sources.add_file(name.as_str(), snippet);

    let src = &sources.get(file).unwrap().src;
    let tokens = Lexer::new(src.as_bytes(), &handler, file).tokenize();
    let mut parser = Parser::new(tokens, &handler);
    let mut module = parser.parse_module(Symbol::intern(&name));

    let analyzer = Analyzer::new(&handler, toggles);
    let analysis = analyzer.analyze_program(std::slice::from_mut(&mut module));

    if handler.has_errors() {
        for record in handler.sorted() {
            eprintln!("{}", record.render(&sources));
        }
        return;
    }
    // Show the type of a sole expression statement, like the original
    // shell did.
    if let [stmt] = module.body.as_slice() {
        if let tocin_par::ast::StmtKind::Expr(expr) = &stmt.kind {
            if let Some(ty) = expr.ty {
                println!("= {}", analysis.types.display(ty));
                return;
            }
        }
    }
    println!("ok");
}
