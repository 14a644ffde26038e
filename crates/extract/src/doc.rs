//! Synopsis extraction and Markdown rendering of package documentation.

use std::collections::BTreeMap;

use crate::source::{Decl, DeclKind};

/// Comment prefixes that mark a licence or authorship notice rather than a
/// description of the package.
const NOTICE_PREFIXES: &[&str] = &["copyright", "all rights", "author"];

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Length of the first sentence: up to a period followed by a space, unless
/// the period follows a single upper-case letter (an initial, as in "J. Doe").
fn first_sentence(s: &str) -> &str {
    let (mut ppp, mut pp, mut p) = (' ', ' ', ' ');
    for (i, q) in s.char_indices() {
        if q == ' ' && p == '.' && (!pp.is_uppercase() || ppp.is_uppercase()) {
            return &s[..i];
        }
        if p == '。' || p == '．' {
            return &s[..i];
        }
        (ppp, pp, p) = (pp, p, q);
    }
    s
}

/// The first sentence of the first paragraph of a package comment, with
/// whitespace collapsed.
pub fn synopsis(doc: &str) -> String {
    let paragraph: Vec<&str> = doc.lines().take_while(|line| !line.trim().is_empty()).collect();
    let text = paragraph.join(" ").split_whitespace().collect::<Vec<_>>().join(" ");
    let sentence = first_sentence(&text);
    let lower = sentence.to_lowercase();
    if NOTICE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return String::new();
    }
    sentence.to_string()
}

fn push_decl(out: &mut String, heading: Option<String>, decl: &Decl) {
    if let Some(heading) = heading {
        out.push('\n');
        out.push_str(&heading);
        out.push('\n');
    }
    out.push_str("\n```go\n");
    out.push_str(&decl.signature);
    out.push_str("\n```\n");
    if !decl.doc.is_empty() {
        out.push('\n');
        out.push_str(&decl.doc);
    }
}

/// Render a package's documentation as Markdown.
///
/// Only exported declarations are listed; methods appear under their
/// receiver type and are dropped if that type is unexported. Every section
/// is sorted by name, so the output depends only on the package contents.
pub fn render(package: &str, doc: &str, decls: &[Decl]) -> String {
    let mut consts = BTreeMap::new();
    let mut vars = BTreeMap::new();
    let mut funcs = BTreeMap::new();
    let mut types = BTreeMap::new();
    let mut methods: BTreeMap<&str, BTreeMap<&str, &Decl>> = BTreeMap::new();

    for decl in decls {
        let Some(name) = decl.names.iter().find(|n| is_exported(n)) else {
            continue;
        };
        match (decl.kind, decl.receiver.as_deref()) {
            (DeclKind::Const, _) => {
                consts.insert(name.as_str(), decl);
            },
            (DeclKind::Var, _) => {
                vars.insert(name.as_str(), decl);
            },
            (DeclKind::Type, _) => {
                types.insert(name.as_str(), decl);
            },
            (DeclKind::Func, None) => {
                funcs.insert(name.as_str(), decl);
            },
            (DeclKind::Func, Some(receiver)) => {
                methods.entry(receiver).or_default().insert(name.as_str(), decl);
            },
        }
    }

    let mut out = format!("# package {package}\n");
    if !doc.is_empty() {
        out.push('\n');
        out.push_str(doc);
    }
    if !consts.is_empty() {
        out.push_str("\n## Constants\n");
        consts.values().for_each(|decl| push_decl(&mut out, None, decl));
    }
    if !vars.is_empty() {
        out.push_str("\n## Variables\n");
        vars.values().for_each(|decl| push_decl(&mut out, None, decl));
    }
    if !funcs.is_empty() {
        out.push_str("\n## Functions\n");
        for (name, decl) in &funcs {
            push_decl(&mut out, Some(format!("### func {name}")), decl);
        }
    }
    if !types.is_empty() {
        out.push_str("\n## Types\n");
        for (name, decl) in &types {
            push_decl(&mut out, Some(format!("### type {name}")), decl);
            for (method, decl) in methods.get(name).into_iter().flatten() {
                push_decl(&mut out, Some(format!("#### func ({name}) {method}")), decl);
            }
        }
    }
    out
}
