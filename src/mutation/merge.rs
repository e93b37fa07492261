//! Pairwise mutation merging.

use crate::error::{Error, Result};
use crate::template::Template;
use crate::value::Value;

use super::Mutation;

/// Folds `b` (applied after `a`) into the shortest equivalent sequence.
///
/// Returns one mutation when the pair collapses and both, in order, when it
/// does not. With `aggressive`, prefixes/suffixes with different separators
/// and crossed append/prepend pairs are also combined; crossed list merges
/// are only exact when the variable starts out unset.
pub fn merge(a: Mutation, b: Mutation, aggressive: bool) -> Result<Vec<Mutation>> {
    use Mutation::*;

    let incompatible = |a: &Mutation, b: &Mutation| Error::IncompatibleMutation {
        existing: a.kind(),
        incoming: b.kind(),
    };

    let merged = match (a, b) {
        // Maps only combine with maps.
        (Merge { value: mut left }, Merge { value: right }) => {
            left.extend(right);
            vec![Merge { value: left }]
        }
        (a @ Merge { .. }, b) | (a, b @ Merge { .. }) => vec![a, b],

        (_, Unset) => vec![Unset],
        (Unset, b) => vec![from_unset(b)],
        (_, b @ Set { .. }) => vec![b],
        (a, SetIfUnset { .. }) => vec![a],

        (
            Set { value },
            Prefix {
                template,
                separator,
            },
        ) => match set_text(value, |old| {
            Template::join(Some(separator.as_deref().unwrap_or("")), [template.clone(), old])
        }) {
            SetText::Folded(value) => vec![Set { value }],
            SetText::Opaque(value) => vec![
                Set { value },
                Prefix {
                    template,
                    separator,
                },
            ],
            SetText::Incompatible(kind) => {
                return Err(Error::IncompatibleMutation {
                    existing: kind,
                    incoming: "prefix",
                })
            }
        },

        (
            Set { value },
            Suffix {
                template,
                separator,
            },
        ) => match set_text(value, |old| {
            Template::join(Some(separator.as_deref().unwrap_or("")), [old, template.clone()])
        }) {
            SetText::Folded(value) => vec![Set { value }],
            SetText::Opaque(value) => vec![
                Set { value },
                Suffix {
                    template,
                    separator,
                },
            ],
            SetText::Incompatible(kind) => {
                return Err(Error::IncompatibleMutation {
                    existing: kind,
                    incoming: "suffix",
                })
            }
        },

        (
            Set {
                value: Value::Array(mut old),
            },
            Append { values },
        ) => {
            old.extend(values);
            vec![Set {
                value: Value::Array(old),
            }]
        }
        (
            Set {
                value: Value::Array(old),
            },
            Prepend { values: mut new },
        ) => {
            new.extend(old);
            vec![Set {
                value: Value::Array(new),
            }]
        }
        (a @ Set { value: Value::Mutation(_) }, b @ (Append { .. } | Prepend { .. })) => {
            vec![a, b]
        }
        (Set { value }, b @ (Append { .. } | Prepend { .. })) => {
            return Err(Error::IncompatibleMutation {
                existing: value.kind(),
                incoming: b.kind(),
            })
        }

        (
            Prefix {
                template: first,
                separator: first_sep,
            },
            Prefix {
                template: second,
                separator: second_sep,
            },
        ) if aggressive || first_sep == second_sep => vec![Prefix {
            template: Template::join(
                Some(second_sep.as_deref().unwrap_or("")),
                [second, first],
            ),
            separator: first_sep,
        }],

        (
            Suffix {
                template: first,
                separator: first_sep,
            },
            Suffix {
                template: second,
                separator: second_sep,
            },
        ) if aggressive || first_sep == second_sep => vec![Suffix {
            template: Template::join(
                Some(second_sep.as_deref().unwrap_or("")),
                [first, second],
            ),
            separator: first_sep,
        }],

        (Append { values: mut first }, Append { values: second }) => {
            first.extend(second);
            vec![Append { values: first }]
        }
        (Prepend { values: first }, Prepend { values: mut second }) => {
            second.extend(first);
            vec![Prepend { values: second }]
        }
        (Append { values: first }, Prepend { values: mut second }) if aggressive => {
            second.extend(first);
            vec![Prepend { values: second }]
        }
        (Prepend { values: mut first }, Append { values: second }) if aggressive => {
            first.extend(second);
            vec![Append { values: first }]
        }

        (a @ (Prefix { .. } | Suffix { .. }), b @ (Append { .. } | Prepend { .. }))
        | (a @ (Append { .. } | Prepend { .. }), b @ (Prefix { .. } | Suffix { .. })) => {
            return Err(incompatible(&a, &b))
        }

        (a, b) => vec![a, b],
    };

    Ok(merged)
}

/// The single mutation equivalent to applying `b` to an unset variable.
fn from_unset(b: Mutation) -> Mutation {
    match b {
        Mutation::Set { value } | Mutation::SetIfUnset { value } => Mutation::Set { value },
        Mutation::Prefix { template, .. } | Mutation::Suffix { template, .. } => Mutation::Set {
            value: Value::Template(template),
        },
        Mutation::Append { values } | Mutation::Prepend { values } => Mutation::Set {
            value: Value::Array(values),
        },
        Mutation::Merge { value } => Mutation::Set {
            value: Value::Map(value),
        },
        Mutation::Unset => Mutation::Unset,
    }
}

enum SetText {
    Folded(Value),
    Opaque(Value),
    Incompatible(&'static str),
}

/// Constant-folds a text mutation into a `set` value.
fn set_text<F>(value: Value, f: F) -> SetText
where
    F: FnOnce(Template) -> Template,
{
    match value.as_template() {
        Some(old) => SetText::Folded(Value::Template(f(old))),
        None if matches!(value, Value::Mutation(_)) => SetText::Opaque(value),
        None => SetText::Incompatible(value.kind()),
    }
}
