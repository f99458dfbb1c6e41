//! Template engine.
//!
//! Text is scanned for `@[…]` directives without building a tree.  A single
//! "emitting" flag gates literal text and side effects; `IF`, `WHILE` and
//! `FOREACH` push frames that save it.  Loops rewind the scan position to just
//! past their opening directive, so `WHILE` conditions are re-parsed from the
//! template text on every iteration.
//!
//! | Directive | Effect when emitting |
//! |-----------|----------------------|
//! | `=EXPR` | append the value of `EXPR` |
//! | `IF:EXPR` / `ELSE` / `ENDIF` | conditional section |
//! | `WHILE:EXPR` / `ENDWHILE` | loop while `EXPR` is true |
//! | `FOREACH:name IN EXPR` / `ENDFOREACH` | bind `name` to each element |
//! | `SET:name=EXPR` | bind `name` |
//! | `LIST` | append every binding as `name: value`, emitting or not |
//! | anything else | hand to the [`DirectiveHook`] |

use std::cell::Cell;

use tracing::{debug, trace};

use super::adapter::TypeRegistry;
use super::builtins::Functions;
use super::env::Environment;
use super::expr::{self, EvalContext};
use super::hook::{DirectiveHook, IgnoreUnknown};
use super::value::Value;
use crate::error::{Error, StructuralError};

// ── Evaluation scope ──────────────────────────────────────────────────────────

struct Scope<'a> {
    env: &'a Environment,
    functions: &'a Functions,
    types: &'a TypeRegistry,
}

impl EvalContext for Scope<'_> {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.env.get(name).cloned()
    }

    fn call_fn(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        self.functions.call(name, args)
    }

    fn types(&self) -> Option<&TypeRegistry> {
        Some(self.types)
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Renders templates against a caller-owned [`Environment`].
///
/// One render may be in flight per engine; a nested `render` call (from a
/// hook, say) fails with [`Error::Reentrant`].
#[derive(Debug)]
pub struct Engine {
    functions: Functions,
    types: TypeRegistry,
    rendering: Cell<bool>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-flight flag when a render ends, however it ends.
struct RenderGuard<'a>(&'a Cell<bool>);

impl<'a> RenderGuard<'a> {
    fn acquire(flag: &'a Cell<bool>) -> Result<Self, Error> {
        if flag.replace(true) {
            return Err(Error::Reentrant);
        }
        Ok(RenderGuard(flag))
    }
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Engine {
    /// An engine with the built-in function set and no registered host types.
    pub fn new() -> Self {
        Engine {
            functions: Functions::with_builtins(),
            types: TypeRegistry::new(),
            rendering: Cell::new(false),
        }
    }

    pub fn with_functions(mut self, functions: Functions) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    pub fn functions_mut(&mut self) -> &mut Functions {
        &mut self.functions
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Evaluate a single expression outside of any render.
    pub fn evaluate(&self, expr: &str, env: &Environment) -> Result<Value, Error> {
        expr::evaluate(expr, &self.scope(env))
    }

    /// Render with unknown directives producing no output.
    pub fn render(&self, template: &str, env: &mut Environment) -> Result<String, Error> {
        self.render_with_hook(template, env, &mut IgnoreUnknown)
    }

    /// Render, handing unknown directives to `hook`.
    pub fn render_with_hook<H: DirectiveHook + ?Sized>(
        &self,
        template: &str,
        env: &mut Environment,
        hook: &mut H,
    ) -> Result<String, Error> {
        self.run(template, env, hook, Mode::Interpret)
    }

    /// Pass-through rendering: every directive, built-ins included, goes to
    /// `hook`, and all literal text is emitted.
    pub fn render_delegated<H: DirectiveHook + ?Sized>(
        &self,
        template: &str,
        env: &mut Environment,
        hook: &mut H,
    ) -> Result<String, Error> {
        self.run(template, env, hook, Mode::Delegate)
    }

    fn scope<'a>(&'a self, env: &'a Environment) -> Scope<'a> {
        Scope {
            env,
            functions: &self.functions,
            types: &self.types,
        }
    }

    fn run<H: DirectiveHook + ?Sized>(
        &self,
        template: &str,
        env: &mut Environment,
        hook: &mut H,
        mode: Mode,
    ) -> Result<String, Error> {
        let _guard = RenderGuard::acquire(&self.rendering)?;
        debug!(template_len = template.len(), ?mode, "render started");
        let render = Render {
            engine: self,
            template,
            env,
            hook,
            out: String::with_capacity(template.len()),
            frames: Vec::new(),
            emitting: true,
            pos: 0,
        };
        let out = render.run(mode)?;
        debug!(output_len = out.len(), "render finished");
        Ok(out)
    }
}

// ── Frames ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Interpret,
    Delegate,
}

#[derive(Debug)]
enum Frame<'t> {
    If {
        was_active: bool,
        relevant: bool,
    },
    While {
        resume: usize,
        condition: &'t str,
        was_active: bool,
        relevant: bool,
    },
    Foreach {
        resume: usize,
        name: String,
        items: std::vec::IntoIter<Value>,
        was_active: bool,
    },
}

impl Frame<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Frame::If { .. } => "IF",
            Frame::While { .. } => "WHILE",
            Frame::Foreach { .. } => "FOREACH",
        }
    }
}

fn unexpected(directive: &'static str, expected: &'static str, offset: usize) -> Error {
    Error::Structural {
        offset,
        kind: StructuralError::UnexpectedCloser {
            directive,
            expected,
        },
    }
}

/// Index of the `]` closing a directive body that starts at `start`.
///
/// Nested brackets are balanced; brackets inside double quotes do not count.
/// Quotes toggle on every `"`, backslashes included.
fn find_directive_end(template: &str, start: usize) -> Option<usize> {
    let bytes = template.as_bytes();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => quoted = !quoted,
            _ if quoted => {}
            b'[' => depth += 1,
            b']' if depth == 0 => return Some(i),
            b']' => depth -= 1,
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split a `FOREACH` header at the first `IN` with whitespace on both sides.
fn split_foreach_header(header: &str) -> Option<(&str, &str)> {
    header.match_indices("IN").find_map(|(i, _)| {
        let before = header[..i].chars().next_back()?;
        let after = header[i + 2..].chars().next()?;
        (before.is_whitespace() && after.is_whitespace())
            .then(|| (&header[..i], &header[i + 2..]))
    })
}

// ── Render state ──────────────────────────────────────────────────────────────

struct Render<'r, H: DirectiveHook + ?Sized> {
    engine: &'r Engine,
    template: &'r str,
    env: &'r mut Environment,
    hook: &'r mut H,
    out: String,
    frames: Vec<Frame<'r>>,
    emitting: bool,
    pos: usize,
}

impl<'r, H: DirectiveHook + ?Sized> Render<'r, H> {
    fn scope(&self) -> Scope<'_> {
        self.engine.scope(&*self.env)
    }

    fn emit(&mut self, text: &str) {
        if self.emitting {
            self.out.push_str(text);
        }
    }

    fn run(mut self, mode: Mode) -> Result<String, Error> {
        let template = self.template;
        while self.pos < template.len() {
            let rest = &template[self.pos..];
            let Some(rel) = rest.find('@') else {
                self.emit(rest);
                break;
            };
            let at = self.pos + rel;
            self.emit(&template[self.pos..at]);

            if !template[at + 1..].starts_with('[') {
                self.emit("@");
                self.pos = at + 1;
                continue;
            }

            let end = find_directive_end(template, at + 2).ok_or(Error::Structural {
                offset: at,
                kind: StructuralError::UnterminatedDirective,
            })?;
            let body = &template[at + 2..end];
            self.pos = end + 1;
            trace!(directive = body, offset = at, "directive");

            match mode {
                Mode::Interpret => self.directive(body, at)?,
                Mode::Delegate => self.external(body)?,
            }
        }

        if let Some(frame) = self.frames.last() {
            return Err(Error::Structural {
                offset: template.len(),
                kind: StructuralError::Unclosed(frame.kind()),
            });
        }
        Ok(self.out)
    }

    fn directive(&mut self, body: &'r str, at: usize) -> Result<(), Error> {
        let command = body.trim();
        if let Some(expr) = command.strip_prefix('=') {
            if self.emitting {
                let text = expr::evaluate_text(expr, &self.scope())?;
                self.out.push_str(&text);
            }
            return Ok(());
        }

        let (keyword, arg) = match command.split_once(':') {
            Some((keyword, arg)) => (keyword.trim_end(), Some(arg)),
            None => (command, None),
        };
        match (keyword, arg) {
            ("IF", Some(cond)) => self.open_if(cond),
            ("ELSE", None) => self.flip_else(at),
            ("ENDIF", None) => self.close_if(at),
            ("WHILE", Some(cond)) => self.open_while(cond),
            ("ENDWHILE", None) => self.close_while(at),
            ("FOREACH", Some(header)) => self.open_foreach(header),
            ("ENDFOREACH", None) => self.close_foreach(at),
            ("SET", Some(assignment)) => self.set(assignment),
            ("LIST", None) => {
                let listing = self.env.list();
                self.out.push_str(&listing);
                Ok(())
            }
            _ => self.external(body),
        }
    }

    fn external(&mut self, body: &str) -> Result<(), Error> {
        if !self.emitting {
            return Ok(());
        }
        let text = self
            .hook
            .handle(body, self.pos, &mut *self.env)
            .map_err(|message| Error::Hook {
                directive: body.to_owned(),
                message,
            })?;
        self.out.push_str(&text);
        Ok(())
    }

    // ── IF ────────────────────────────────────────────────────────────────────

    fn open_if(&mut self, cond: &str) -> Result<(), Error> {
        let relevant = self.emitting;
        self.frames.push(Frame::If {
            was_active: self.emitting,
            relevant,
        });
        if relevant {
            self.emitting = expr::evaluate_bool(cond, &self.scope())?;
        }
        Ok(())
    }

    fn flip_else(&mut self, at: usize) -> Result<(), Error> {
        match self.frames.last() {
            Some(Frame::If { relevant, .. }) => {
                if *relevant {
                    self.emitting = !self.emitting;
                }
                Ok(())
            }
            _ => Err(unexpected("ELSE", "IF", at)),
        }
    }

    fn close_if(&mut self, at: usize) -> Result<(), Error> {
        match self.frames.pop() {
            Some(Frame::If {
                was_active,
                relevant,
            }) => {
                if relevant {
                    self.emitting = was_active;
                }
                Ok(())
            }
            _ => Err(unexpected("ENDIF", "IF", at)),
        }
    }

    // ── WHILE ─────────────────────────────────────────────────────────────────

    fn open_while(&mut self, cond: &'r str) -> Result<(), Error> {
        let relevant = self.emitting;
        self.frames.push(Frame::While {
            resume: self.pos,
            condition: cond,
            was_active: self.emitting,
            relevant,
        });
        if relevant {
            self.emitting = expr::evaluate_bool(cond, &self.scope())?;
        }
        Ok(())
    }

    fn close_while(&mut self, at: usize) -> Result<(), Error> {
        let (resume, condition, relevant) = match self.frames.last() {
            Some(Frame::While {
                resume,
                condition,
                relevant,
                ..
            }) => (*resume, *condition, *relevant),
            _ => return Err(unexpected("ENDWHILE", "WHILE", at)),
        };
        if relevant && expr::evaluate_bool(condition, &self.scope())? {
            self.pos = resume;
            self.emitting = true;
            return Ok(());
        }
        if let Some(Frame::While { was_active, .. }) = self.frames.pop() {
            self.emitting = was_active;
        }
        Ok(())
    }

    // ── FOREACH ───────────────────────────────────────────────────────────────

    fn open_foreach(&mut self, header: &str) -> Result<(), Error> {
        let was_active = self.emitting;
        let mut name = String::new();
        let mut items = Vec::new().into_iter();

        if self.emitting {
            match split_foreach_header(header) {
                None => {
                    debug!(header, "FOREACH without IN, body skipped");
                    self.emitting = false;
                }
                Some((target, source)) => {
                    let scope = self.scope();
                    let source = expr::evaluate(source, &scope)?;
                    name = expr::evaluate_name(target, &scope)?;
                    match source.items() {
                        Some(values) => items = values.into_iter(),
                        None => debug!(kind = source.type_name(), "FOREACH source is not iterable"),
                    }
                    match items.next() {
                        Some(first) => self.env.set(name.as_str(), first),
                        None => self.emitting = false,
                    }
                }
            }
        }

        self.frames.push(Frame::Foreach {
            resume: self.pos,
            name,
            items,
            was_active,
        });
        Ok(())
    }

    fn close_foreach(&mut self, at: usize) -> Result<(), Error> {
        let next = match self.frames.last_mut() {
            Some(Frame::Foreach {
                resume,
                name,
                items,
                ..
            }) => items.next().map(|value| (*resume, name.clone(), value)),
            _ => return Err(unexpected("ENDFOREACH", "FOREACH", at)),
        };
        if let Some((resume, name, value)) = next {
            self.env.set(name, value);
            self.pos = resume;
            self.emitting = true;
            return Ok(());
        }
        if let Some(Frame::Foreach { was_active, .. }) = self.frames.pop() {
            self.emitting = was_active;
        }
        Ok(())
    }

    // ── SET ───────────────────────────────────────────────────────────────────

    fn set(&mut self, assignment: &str) -> Result<(), Error> {
        if !self.emitting {
            return Ok(());
        }
        let Some((target, value)) = assignment.split_once('=') else {
            debug!(assignment, "SET without `=`, ignored");
            return Ok(());
        };
        let scope = self.scope();
        let value = expr::evaluate(value, &scope)?;
        let name = expr::evaluate_name(target, &scope)?;
        self.env.set(name, value);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
