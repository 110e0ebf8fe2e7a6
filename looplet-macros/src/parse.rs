use syn::{Attribute, Meta};

/// True if `attr` is one of the spellings of the built-in test attribute:
/// `#[test]` itself, or a prelude path like `#[::core::prelude::v1::test]`.
pub(crate) fn is_test_attribute(attr: &Attribute) -> bool {
    let Meta::Path(path) = &attr.meta else {
        return false;
    };
    if path.segments.iter().any(|segment| !segment.arguments.is_none()) {
        return false;
    }
    if path.is_ident("test") {
        return true;
    }

    let idents: Vec<String> = path
        .segments
        .iter()
        .map(|segment| segment.ident.to_string())
        .collect();
    matches!(
        idents.as_slice(),
        [root, prelude, _edition, name]
            if (root == "core" || root == "std") && prelude == "prelude" && name == "test"
    )
}

/// Rewrites inner attributes (`#![...]`) as outer ones so they survive being
/// re-emitted at item position; the expanded function body is a plain block
/// and cannot carry them. Outer attributes keep their original order and
/// come first.
pub(crate) fn lift_inner_attrs(attrs: Vec<Attribute>) -> Vec<Attribute> {
    let (mut outer, inner): (Vec<_>, Vec<_>) = attrs
        .into_iter()
        .partition(|attr| matches!(attr.style, syn::AttrStyle::Outer));

    outer.extend(inner.into_iter().map(|mut attr| {
        attr.style = syn::AttrStyle::Outer;
        attr
    }));
    outer
}
