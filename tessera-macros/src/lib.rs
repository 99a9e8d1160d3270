//! Procedural macros for the `tessera` runtime.
//!
//! - `#[tessera::main]` and `#[tessera::test]` run an `async fn` to
//!   completion on a fresh runtime,
//! - `#[tessera::instrument]` derives `Instrument::hooks` from the methods an
//!   instrument `impl` block defines.

mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Builds the runtime expression for the flags given to `main` or `test`.
fn runtime_builder(flags: &[String]) -> Result<String, String> {
    let mut builder = String::from("::tessera::RuntimeBuilder::new()");

    for flag in flags {
        match flag.as_str() {
            "autojump" => builder.push_str(".autojump_clock()"),
            "mock_clock" => builder.push_str(".mock_clock()"),
            other => return Err(format!("unknown tessera runtime option `{other}`")),
        }
    }

    builder.push_str(".build().expect(\"failed to build the tessera runtime\")");
    Ok(builder)
}

/// Replaces the body of an `async fn` with a blocking run on a new runtime.
fn run_on_runtime(attr: TokenStream, item: TokenStream, macro_name: &str) -> Vec<TokenTree> {
    let builder = match runtime_builder(&utils::parse_flags(attr)) {
        Ok(builder) => builder,
        Err(msg) => return utils::error(&msg).into_iter().collect(),
    };

    let mut tokens: Vec<TokenTree> = item.into_iter().collect();
    utils::strip_async(&mut tokens);

    let Some(pos) = utils::body_position(&tokens) else {
        return utils::error(&format!("#[{macro_name}] expects a function"))
            .into_iter()
            .collect();
    };

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => return Vec::new(),
    };

    // The body becomes an inner `async fn` so that `?` sees the declared
    // return type.
    let output = match utils::return_type(&tokens[..pos]) {
        Some(ret) => format!("-> {ret}"),
        None => String::new(),
    };

    let new_block = format!(
        "{{
            async fn __tessera_body() {output} {{ {block} }}

            let runtime = {builder};
            runtime
                .block_on(__tessera_body())
                .expect(\"tessera runtime failed\")
        }}"
    );

    tokens[pos] = TokenTree::Group(Group::new(
        Delimiter::Brace,
        utils::parse_or_error(&new_block, macro_name),
    ));

    tokens
}

/// Runs `async fn main` on a new runtime.
///
/// Accepts `autojump` or `mock_clock` to use a mock clock.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    run_on_runtime(attr, item, "main").into_iter().collect()
}

/// Runs an `async fn` test on a new runtime.
///
/// `#[tessera::test(autojump)]` uses an autojump mock clock, so sleeps end
/// as soon as every task is blocked.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let tokens = run_on_runtime(attr, item, "test");

    let test_attr: TokenStream = "#[test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}

/// Generates `Instrument::hooks` for an `impl Instrument for ...` block.
///
/// The generated set contains a hook for every hook method the block
/// defines. A block that defines `hooks` itself is left untouched.
#[proc_macro_attribute]
pub fn instrument(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(pos) = utils::body_position(&tokens) else {
        return utils::error("#[instrument] expects an impl block");
    };

    let body = match &tokens[pos] {
        TokenTree::Group(g) => g.stream(),
        _ => return tokens.into_iter().collect(),
    };

    let names = utils::fn_names(body.clone());
    if names.iter().any(|name| name == "hooks") {
        return tokens.into_iter().collect();
    }

    let set = names
        .iter()
        .filter_map(|name| utils::hook_variant(name))
        .map(|variant| format!(".with(::tessera::instrument::Hook::{variant})"))
        .collect::<String>();

    let hooks_fn = format!(
        "fn hooks(&self) -> ::tessera::instrument::HookSet {{
            ::tessera::instrument::HookSet::EMPTY{set}
        }}"
    );

    let mut new_body = body;
    new_body.extend(utils::parse_or_error(&hooks_fn, "instrument"));

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, new_body));
    tokens.into_iter().collect()
}
