use proc_macro::{Delimiter, TokenStream, TokenTree};

/// Instrument methods and the `Hook` variant each one corresponds to.
const HOOKS: [(&str, &str); 9] = [
    ("before_run", "BeforeRun"),
    ("after_run", "AfterRun"),
    ("task_spawned", "TaskSpawned"),
    ("task_scheduled", "TaskScheduled"),
    ("before_task_step", "BeforeTaskStep"),
    ("after_task_step", "AfterTaskStep"),
    ("task_exited", "TaskExited"),
    ("before_io_wait", "BeforeIoWait"),
    ("after_io_wait", "AfterIoWait"),
];

/// Returns the `Hook` variant for an instrument method name.
pub(crate) fn hook_variant(method: &str) -> Option<&'static str> {
    HOOKS
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, variant)| *variant)
}

/// Splits attribute arguments on commas into trimmed, non-empty flags.
///
/// `#[tessera::test(autojump)]` yields `["autojump"]`.
pub(crate) fn parse_flags(attr: TokenStream) -> Vec<String> {
    attr.to_string()
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Removes the first `async` keyword, turning `async fn` into `fn`.
pub(crate) fn strip_async(tokens: &mut Vec<TokenTree>) {
    if let Some(pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(pos);
    }
}

/// Position of the last brace-delimited group: a function body or an
/// `impl` block body.
pub(crate) fn body_position(tokens: &[TokenTree]) -> Option<usize> {
    tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
}

/// Source of the return type in a function signature, if it declares one.
pub(crate) fn return_type(signature: &[TokenTree]) -> Option<String> {
    let arrow = signature.windows(2).position(|pair| {
        matches!(
            pair,
            [TokenTree::Punct(dash), TokenTree::Punct(gt)]
                if dash.as_char() == '-' && gt.as_char() == '>'
        )
    })?;

    let ret = tokens_to_string(&signature[arrow + 2..]);
    (!ret.trim().is_empty()).then_some(ret)
}

/// Converts a slice of tokens into a Rust source string.
///
/// Consecutive identifiers are separated by a space to avoid merging them
/// (`dyn Error` vs `dynError`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let is_ident = matches!(t, TokenTree::Ident(_));
        if prev_was_ident && is_ident {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = is_ident;
    }

    out
}

/// Names of the functions defined at the top level of `body`.
///
/// Only `fn <name>` pairs directly in the stream are considered; nested
/// groups (function bodies, generics) are not entered.
pub(crate) fn fn_names(body: TokenStream) -> Vec<String> {
    let tokens: Vec<TokenTree> = body.into_iter().collect();

    tokens
        .windows(2)
        .filter_map(|pair| match pair {
            [TokenTree::Ident(kw), TokenTree::Ident(name)] if kw.to_string() == "fn" => {
                Some(name.to_string())
            }
            _ => None,
        })
        .collect()
}

/// Turns generated source into tokens, or into a `compile_error!` naming
/// the macro that produced it.
pub(crate) fn parse_or_error(source: &str, macro_name: &str) -> TokenStream {
    source.parse().unwrap_or_else(|err| {
        let msg = format!("{macro_name} macro error: {err}");
        format!("compile_error!({msg:?});")
            .parse()
            .unwrap_or_default()
    })
}

/// A `compile_error!` invocation carrying `msg`.
pub(crate) fn error(msg: &str) -> TokenStream {
    format!("compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}
