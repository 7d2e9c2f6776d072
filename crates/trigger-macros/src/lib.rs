/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! The `#[task(...)]` registration attribute.
//!
//! Expands a plain (sync or async) function into a registered task: the
//! original function body is kept, a thin `TaskHandler` wrapper is
//! generated around it, and a `ctor`-annotated block inserts a constructor
//! closure into the process-wide registry before `main` runs. This is the
//! static-language rendition of the source SDK's import-time side-effect
//! registration.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Expr, ExprLit, Ident, ItemFn, Lit, Meta, Token};

#[derive(Default)]
struct RetryAttr {
    max_attempts: Option<u32>,
    min_timeout_in_ms: Option<u64>,
    max_timeout_in_ms: Option<u64>,
    factor: Option<f64>,
    randomize: Option<bool>,
}

#[derive(Default)]
struct QueueAttr {
    name: Option<String>,
    concurrency_limit: Option<u32>,
}

#[derive(Default)]
struct TaskAttributes {
    id: Option<String>,
    retry: Option<RetryAttr>,
    queue: Option<QueueAttr>,
    max_duration: Option<u64>,
    description: Option<String>,
}

fn lit_str(expr: &Expr) -> Option<String> {
    if let Expr::Lit(ExprLit {
        lit: Lit::Str(s), ..
    }) = expr
    {
        Some(s.value())
    } else {
        None
    }
}

fn lit_int<T: std::str::FromStr>(expr: &Expr) -> Option<T> {
    if let Expr::Lit(ExprLit {
        lit: Lit::Int(i), ..
    }) = expr
    {
        i.base10_parse::<T>().ok()
    } else {
        None
    }
}

fn lit_float(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Float(f), ..
        }) => f.base10_parse::<f64>().ok(),
        Expr::Lit(ExprLit {
            lit: Lit::Int(i), ..
        }) => i.base10_parse::<f64>().ok(),
        _ => None,
    }
}

fn lit_bool(expr: &Expr) -> Option<bool> {
    if let Expr::Lit(ExprLit {
        lit: Lit::Bool(b), ..
    }) = expr
    {
        Some(b.value)
    } else {
        None
    }
}

/// Parse a nested `retry(max_attempts = 5, ...)` / `queue(name = "q")` list
/// of `ident = literal` pairs out of a parenthesized token stream.
fn parse_kv_list(tokens: TokenStream2) -> syn::Result<Vec<(Ident, Expr)>> {
    struct KvList(Vec<(Ident, Expr)>);
    impl Parse for KvList {
        fn parse(input: ParseStream) -> syn::Result<Self> {
            let pairs: Punctuated<syn::MetaNameValue, Token![,]> =
                Punctuated::parse_terminated(input)?;
            Ok(KvList(
                pairs
                    .into_iter()
                    .filter_map(|nv| nv.path.get_ident().cloned().map(|id| (id, nv.value)))
                    .collect(),
            ))
        }
    }
    let parsed: KvList = syn::parse2(tokens)?;
    Ok(parsed.0)
}

impl Parse for TaskAttributes {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let metas: Punctuated<Meta, Token![,]> = Punctuated::parse_terminated(input)?;
        let mut attrs = TaskAttributes::default();

        for meta in metas {
            match meta {
                Meta::NameValue(nv) if nv.path.is_ident("id") => {
                    attrs.id = lit_str(&nv.value);
                }
                Meta::NameValue(nv) if nv.path.is_ident("max_duration") => {
                    attrs.max_duration = lit_int::<u64>(&nv.value);
                }
                Meta::NameValue(nv) if nv.path.is_ident("description") => {
                    attrs.description = lit_str(&nv.value);
                }
                Meta::List(list) if list.path.is_ident("retry") => {
                    let mut retry = RetryAttr::default();
                    for (ident, expr) in parse_kv_list(list.tokens)? {
                        match ident.to_string().as_str() {
                            "max_attempts" => retry.max_attempts = lit_int(&expr),
                            "min_timeout_in_ms" => retry.min_timeout_in_ms = lit_int(&expr),
                            "max_timeout_in_ms" => retry.max_timeout_in_ms = lit_int(&expr),
                            "factor" => retry.factor = lit_float(&expr),
                            "randomize" => retry.randomize = lit_bool(&expr),
                            other => {
                                return Err(syn::Error::new(
                                    ident.span(),
                                    format!("unknown retry field `{other}`"),
                                ))
                            }
                        }
                    }
                    attrs.retry = Some(retry);
                }
                Meta::List(list) if list.path.is_ident("queue") => {
                    let mut queue = QueueAttr::default();
                    for (ident, expr) in parse_kv_list(list.tokens)? {
                        match ident.to_string().as_str() {
                            "name" => queue.name = lit_str(&expr),
                            "concurrency_limit" => queue.concurrency_limit = lit_int(&expr),
                            other => {
                                return Err(syn::Error::new(
                                    ident.span(),
                                    format!("unknown queue field `{other}`"),
                                ))
                            }
                        }
                    }
                    attrs.queue = Some(queue);
                }
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "unrecognized #[task(...)] attribute key",
                    ))
                }
            }
        }

        Ok(attrs)
    }
}

fn to_pascal_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[proc_macro_attribute]
pub fn task(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attrs = parse_macro_input!(attr as TaskAttributes);
    let func = parse_macro_input!(item as ItemFn);

    let fn_name = &func.sig.ident;
    let fn_vis = &func.vis;
    let fn_asyncness = &func.sig.asyncness;
    let is_async = fn_asyncness.is_some();

    let task_id = match attrs.id {
        Some(id) => id,
        None => fn_name.to_string(),
    };

    let struct_name = format_ident!("{}Task", to_pascal_case(&task_id.replace(['-', '.'], "_")));
    let register_fn_name = format_ident!("__register_{}_task", fn_name);

    let retry_expr = match attrs.retry {
        Some(r) => {
            let max_attempts = r.max_attempts.unwrap_or(3);
            let min_timeout_in_ms = r.min_timeout_in_ms.unwrap_or(1000);
            let max_timeout_in_ms = r.max_timeout_in_ms.unwrap_or(60_000);
            let factor = r.factor.unwrap_or(2.0);
            let randomize = r.randomize.unwrap_or(true);
            quote! {
                Some(trigger_wire::RetryConfig {
                    max_attempts: #max_attempts,
                    min_timeout_in_ms: #min_timeout_in_ms,
                    max_timeout_in_ms: #max_timeout_in_ms,
                    factor: #factor,
                    randomize: #randomize,
                })
            }
        }
        None => quote! { None },
    };

    let queue_expr = match attrs.queue {
        Some(q) => {
            let name_expr = match q.name {
                Some(n) => quote! { Some(#n.to_string()) },
                None => quote! { None },
            };
            let limit_expr = match q.concurrency_limit {
                Some(l) => quote! { Some(#l) },
                None => quote! { None },
            };
            quote! {
                Some(trigger_wire::QueueConfig {
                    name: #name_expr,
                    concurrency_limit: #limit_expr,
                })
            }
        }
        None => quote! { None },
    };

    let max_duration_expr = match attrs.max_duration {
        Some(d) => quote! { Some(#d) },
        None => quote! { None },
    };

    let description_expr = match attrs.description {
        Some(d) => quote! { Some(#d.to_string()) },
        None => quote! { None },
    };

    // The execute body: async functions are awaited directly; sync
    // functions are dispatched to the blocking pool so they do not
    // monopolize the event loop (spec.md §4.2, §5).
    let execute_body = if is_async {
        quote! { #fn_name(payload).await }
    } else {
        quote! {
            match ::tokio::task::spawn_blocking(move || #fn_name(payload)).await {
                Ok(result) => result,
                Err(join_err) => Err(::anyhow::anyhow!("task panicked: {join_err}")),
            }
        }
    };

    let expanded = quote! {
        #func

        #[doc(hidden)]
        #fn_vis struct #struct_name;

        #[::trigger_runtime::async_trait::async_trait]
        impl ::trigger_runtime::registry::TaskHandler for #struct_name {
            async fn execute(
                &self,
                payload: ::serde_json::Value,
            ) -> ::anyhow::Result<::serde_json::Value> {
                #execute_body
            }

            fn id(&self) -> &str {
                #task_id
            }
        }

        const _: () = {
            #[::trigger_runtime::ctor::ctor]
            fn #register_fn_name() {
                ::trigger_runtime::registry::register_task_constructor(
                    #task_id,
                    file!().to_string(),
                    #retry_expr,
                    #queue_expr,
                    #max_duration_expr,
                    #description_expr,
                    || ::std::sync::Arc::new(#struct_name) as ::std::sync::Arc<dyn ::trigger_runtime::registry::TaskHandler>,
                );
            }
        };
    };

    expanded.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn to_pascal_case_handles_snake_and_kebab() {
        assert_eq!(to_pascal_case("hello_world"), "HelloWorld");
        assert_eq!(to_pascal_case("hello-world"), "HelloWorld");
        assert_eq!(to_pascal_case("hello"), "Hello");
    }

    #[test]
    fn parses_id_and_nested_retry() {
        let attrs: TaskAttributes = parse_quote_attr(quote! {
            id = "hello", retry(max_attempts = 5, factor = 1.5)
        });
        assert_eq!(attrs.id.as_deref(), Some("hello"));
        let retry = attrs.retry.expect("retry parsed");
        assert_eq!(retry.max_attempts, Some(5));
        assert_eq!(retry.factor, Some(1.5));
    }

    fn parse_quote_attr(tokens: TokenStream2) -> TaskAttributes {
        syn::parse2(tokens).expect("attribute parses")
    }

    #[allow(unused)]
    fn _type_check_item_fn() {
        let _: ItemFn = parse_quote! {
            async fn hello(payload: serde_json::Value) -> anyhow::Result<serde_json::Value> {
                Ok(payload)
            }
        };
    }
}
