//! Pipeline orchestration: source loading, module resolution, the four
//! compiler phases, diagnostics rendering, and exit codes.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use tocin_gen::lower_to_ir;
use tocin_lex::Lexer;
use tocin_par::{ast::Module, ast::StmtKind, pretty_print, Parser};
use tocin_sem::{Analyzer, FeatureToggles, ModuleGraph};
use tocin_util::diagnostic::codes;
use tocin_util::{FxHashMap, Handler, Severity, SourceMap, Span, Symbol};

use crate::{Cli, Target};

/// Environment variable extending the module search path
/// (colon/semicolon separated).
pub const MODULE_PATH_VAR: &str = "TOCIN_MODULE_PATH";

/// One compilation session: a unit's sources, sink, and options. Each
/// session is independent; parallel driver invocations share nothing
/// mutable.
pub struct Session {
    pub sources: SourceMap,
    pub handler: Handler,
    output: Option<PathBuf>,
    target: Target,
    dump_ast: bool,
    dump_ir: bool,
    show_time: bool,
    show_info: bool,
    toggles: FeatureToggles,
    timings: Vec<(&'static str, Duration)>,
}

impl Session {
    pub fn new(cli: &Cli) -> Self {
        Self {
            sources: SourceMap::new(),
            handler: Handler::new(),
            output: cli.output.clone(),
            target: cli.target,
            dump_ast: cli.dump_ast,
            dump_ir: cli.dump_ir,
            show_time: cli.time,
            show_info: cli.debug,
            toggles: FeatureToggles {
                allow_async: !cli.no_async,
                allow_concurrency: !cli.no_concurrency,
                allow_advanced: !cli.no_advanced,
            },
            timings: Vec::new(),
        }
    }

    /// Compile one input file; returns the process exit code.
    pub fn compile(&mut self, input: &Path) -> i32 {
        let result = self.compile_inner(input);
        self.render_diagnostics();
        if self.show_time {
            self.render_timings();
        }
        match result {
            Some(()) if !self.handler.has_errors() => 0,
            _ => self.failure_code(),
        }
    }

    fn compile_inner(&mut self, input: &Path) -> Option<()> {
        let load_start = Instant::now();
        let mut modules = self.load_program(input)?;
        self.timings.push(("lex+parse", load_start.elapsed()));

        if self.dump_ast {
            if let Some(main) = modules.last() {
                println!("{}", pretty_print(main));
            }
        }
        if self.handler.has_fatal() {
            return None;
        }

        let sem_start = Instant::now();
        let analyzer = Analyzer::new(&self.handler, self.toggles);
        let mut analysis = analyzer.analyze_program(&mut modules);
        self.timings.push(("semantic", sem_start.elapsed()));
        debug!(errors = self.handler.error_count(), "semantic analysis done");

        if self.handler.has_errors() {
            // Degraded mode ends here: lowering a poisoned AST would
            // only manufacture noise.
            return None;
        }

        if self.target == Target::Wasm {
            self.handler.error(
                codes::G001_FEATURE_DISABLED,
                "the WebAssembly back-end shell is not part of this build",
                Span::DUMMY,
            );
            return None;
        }

        let gen_start = Instant::now();
        let merged = merge_modules(modules);
        let ir = lower_to_ir(&merged, &mut analysis, &self.handler, merged.name.as_str()).ok()?;
        self.timings.push(("codegen", gen_start.elapsed()));

        if self.dump_ir {
            println!("{ir}");
        }
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| input.with_extension(self.default_extension()));
        if let Err(error) = std::fs::write(&output, &ir) {
            self.handler.error(
                codes::I004_WRITE_FAILED,
                format!("cannot write `{}`: {error}", output.display()),
                Span::DUMMY,
            );
            return None;
        }
        debug!(output = %output.display(), "wrote module");
        Some(())
    }

    fn default_extension(&self) -> &'static str {
        match self.target {
            Target::Native => "ll",
            Target::Wasm => "wat",
        }
    }

    // ----- loading ------------------------------------------------------

    /// Read, lex, and parse the input and everything it transitively
    /// imports. Modules come back dependency-first with the entry
    /// module last; cyclic imports are fatal.
    fn load_program(&mut self, input: &Path) -> Option<Vec<Module>> {
        let main_name = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string());
        let main_key = Symbol::intern(&main_name);
        let main_module = self.parse_file(input, main_key)?;

        let mut graph = ModuleGraph::new();
        graph.add_module(main_key);
        let mut loaded: FxHashMap<Symbol, Module> = FxHashMap::default();
        let mut queue = vec![(main_key, main_module)];
        let search_roots = self.search_roots(input);

        while let Some((key, module)) = queue.pop() {
            for (dep_key, segments, span) in imports_of(&module) {
                graph.add_import(key, dep_key, span);
                if dep_key == main_key || loaded.contains_key(&dep_key) {
                    continue;
                }
                if queue.iter().any(|(k, _)| *k == dep_key) {
                    continue;
                }
                match resolve_module_file(&search_roots, &segments) {
                    Some(path) => {
                        if let Some(dep) = self.parse_file(&path, dep_key) {
                            queue.push((dep_key, dep));
                        }
                    }
                    None => {
                        self.handler.error(
                            codes::I002_MODULE_NOT_FOUND,
                            format!("cannot find module `{dep_key}` on the search path"),
                            span,
                        );
                    }
                }
            }
            loaded.insert(key, module);
        }

        let order = graph.toposort(&self.handler).ok()?;
        let mut modules = Vec::with_capacity(loaded.len());
        for key in order {
            if let Some(module) = loaded.remove(&key) {
                modules.push(module);
            }
        }
        Some(modules)
    }

    /// Read a source file as raw bytes and lex/parse it. UTF-8 is not
    /// validated up front: the lexer passes invalid bytes through
    /// verbatim inside string literals and reports them (L001) only
    /// outside. The source map keeps a lossy textual copy for
    /// diagnostics.
    fn parse_file(&mut self, path: &Path, module_name: Symbol) -> Option<Module> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) => {
                self.handler.error(
                    codes::I001_FILE_NOT_FOUND,
                    format!("cannot read `{}`: {error}", path.display()),
                    Span::DUMMY,
                );
                return None;
            }
        };
        let display_src = String::from_utf8_lossy(&bytes).into_owned();
        let file = self.sources.add_file(path.display().to_string(), display_src);
        debug!(path = %path.display(), "lexing");
        let tokens = Lexer::new(&bytes, &self.handler, file).tokenize();
        debug!(tokens = tokens.len(), "parsing");
        let mut parser = Parser::new(tokens, &self.handler);
        Some(parser.parse_module(module_name))
    }

    /// Module lookup roots: the input's directory, then each entry of
    /// `TOCIN_MODULE_PATH`.
    fn search_roots(&self, input: &Path) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(parent) = input.parent() {
            let parent = if parent.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                parent.to_path_buf()
            };
            roots.push(parent);
        }
        if let Ok(var) = std::env::var(MODULE_PATH_VAR) {
            for entry in var.split([':', ';']).filter(|e| !e.is_empty()) {
                roots.push(PathBuf::from(entry));
            }
        }
        roots
    }

    // ----- reporting ----------------------------------------------------

    fn render_diagnostics(&self) {
        let records = self.handler.sorted();
        for record in &records {
            if record.severity == Severity::Info && !self.show_info {
                continue;
            }
            eprintln!("{}", record.render(&self.sources));
            for note in &record.notes {
                eprintln!("  note: {}", note.message);
            }
        }
        let errors = self.handler.error_count();
        let warnings = self.handler.warning_count();
        if errors > 0 {
            eprintln!("{errors} error(s), {warnings} warning(s)");
        } else if warnings > 0 {
            eprintln!("{warnings} warning(s)");
        }
    }

    fn render_timings(&self) {
        eprintln!("phase timings:");
        let mut total = Duration::ZERO;
        for (name, duration) in &self.timings {
            eprintln!("  {:<10} {:>9.3} ms", name, duration.as_secs_f64() * 1e3);
            total += *duration;
        }
        eprintln!("  {:<10} {:>9.3} ms", "total", total.as_secs_f64() * 1e3);
    }

    /// 1 for ordinary failures, 2 when an internal-compiler-error
    /// diagnostic was recorded.
    fn failure_code(&self) -> i32 {
        let ice = self.handler.diagnostics().iter().any(|d| {
            d.code == codes::C001_VERIFIER_FAILED || d.code == codes::G002_INTERNAL
        });
        if ice {
            2
        } else {
            1
        }
    }
}

/// All import edges of a module (dotted key, path segments, span).
fn imports_of(module: &Module) -> Vec<(Symbol, Vec<Symbol>, Span)> {
    fn walk(stmts: &[tocin_par::ast::Stmt], out: &mut Vec<(Symbol, Vec<Symbol>, Span)>) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Import(import) => {
                    let joined: Vec<&str> = import.path.iter().map(|s| s.as_str()).collect();
                    out.push((
                        Symbol::intern(&joined.join(".")),
                        import.path.clone(),
                        import.span,
                    ));
                }
                StmtKind::Export(inner) => walk(std::slice::from_ref(inner), out),
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(&module.body, &mut out);
    out
}

/// For `import a.b`, try `<root>/a/b.to` then `<root>/a/b/mod.to` under
/// each search root.
fn resolve_module_file(roots: &[PathBuf], segments: &[Symbol]) -> Option<PathBuf> {
    let rel: PathBuf = segments.iter().map(|s| s.as_str()).collect();
    for root in roots {
        let file = root.join(&rel).with_extension("to");
        if file.is_file() {
            return Some(file);
        }
        let dir_mod = root.join(&rel).join("mod.to");
        if dir_mod.is_file() {
            return Some(dir_mod);
        }
    }
    None
}

/// Whole-program lowering works on one merged module: dependencies
/// first, entry module last, so top-level statements run in dependency
/// order.
fn merge_modules(mut modules: Vec<Module>) -> Module {
    let main = modules.pop().expect("at least the entry module");
    if modules.is_empty() {
        return main;
    }
    let mut body = Vec::new();
    for module in modules {
        body.extend(module.body);
    }
    body.extend(main.body);
    Module {
        name: main.name,
        body,
        span: main.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_module_file_prefers_flat_file() {
        let dir = std::env::temp_dir().join(format!("tocin-test-{}", std::process::id()));
        let nested = dir.join("util");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("text.to"), "export def f():\n    return\n").unwrap();

        let found = resolve_module_file(
            &[dir.clone()],
            &[Symbol::intern("util"), Symbol::intern("text")],
        );
        assert_eq!(found, Some(nested.join("text.to")));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_module_file_falls_back_to_mod() {
        let dir = std::env::temp_dir().join(format!("tocin-test-mod-{}", std::process::id()));
        let nested = dir.join("util").join("math");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("mod.to"), "export def f():\n    return\n").unwrap();

        let found = resolve_module_file(
            &[dir.clone()],
            &[Symbol::intern("util"), Symbol::intern("math")],
        );
        assert_eq!(found, Some(nested.join("mod.to")));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_merge_modules_keeps_dependency_order() {
        use tocin_par::parse_source;
        let handler = Handler::new();
        let dep = parse_source("let dep_marker = 1\n", "dep", &handler);
        let main = parse_source("let main_marker = 2\n", "main", &handler);
        let merged = merge_modules(vec![dep, main]);
        assert_eq!(merged.name.as_str(), "main");
        assert_eq!(merged.body.len(), 2);
        assert!(matches!(
            &merged.body[0].kind,
            StmtKind::Let { name, .. } if name.as_str() == "dep_marker"
        ));
    }
}
