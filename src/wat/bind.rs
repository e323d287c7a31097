//! Index binding: the pass run after the token sweep.
//!
//! Exports, `start` and calls may refer to functions declared later in the
//! source, and type uses may refer to types declared later. The sweep leaves
//! those references as written; this pass replaces each with its numeral,
//! failing on the first that names nothing.

use super::error::{FormatError, Namespace, ParseErrorKind};
use super::ids::IdContext;
use super::token::Span;
use crate::encoding::{patch_padded_vu32, PADDED_U32_WIDTH};
use crate::module::{Code, DraftModule, ExportFunc, Index, Module, Reference, TypeUse};

/// Resolves every reference in `draft`, appending its implicit types after
/// the explicit ones.
///
/// Numeric references are range checked as well, so `(func 9)` in a module
/// with fewer functions fails the same way an unknown `$id` does.
pub fn bind(draft: DraftModule, type_ids: &IdContext, func_ids: &IdContext) -> Result<Module, FormatError> {
    let DraftModule {
        mut types,
        inlined_types,
        import_funcs,
        type_uses,
        code,
        export_funcs,
        start_function,
        mut names,
    } = draft;

    let explicit = types.len() as u32;
    types.extend(inlined_types);
    let type_count = types.len() as u32;
    let function_count = type_uses.len() as u32;
    let imported = import_funcs.len();

    let func_context = |i: usize| {
        if i < imported {
            format!("module.import[{}].func", i)
        } else {
            format!("module.func[{}]", i)
        }
    };

    let type_uses = type_uses
        .into_iter()
        .enumerate()
        .map(|(i, type_use)| match type_use {
            TypeUse::Inlined(k) => Ok(explicit + k),
            TypeUse::Ref(reference) => resolve(&reference, type_ids, type_count, Namespace::Type, || {
                func_context(i)
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut bound = Vec::with_capacity(code.len());
    for (k, draft) in code.into_iter().enumerate() {
        let func_index = imported + k;
        let context = || func_context(func_index);
        let params = type_uses
            .get(func_index)
            .and_then(|&t| types.get(t as usize))
            .map_or(0, |sig| sig.params.len() as u32);
        let mut body = draft.body.code;

        for relocation in &draft.body.relocations {
            let index = resolve(&relocation.target, func_ids, function_count, Namespace::Func, &context)?;
            let slot = padded_slot(&mut body, relocation.offset).ok_or_else(|| {
                FormatError::new(
                    relocation.target.span,
                    context(),
                    ParseErrorKind::BadRelocation(relocation.offset),
                )
            })?;
            patch_padded_vu32(slot, index);
        }

        for relocation in &draft.body.local_relocations {
            let bad = || FormatError::new(relocation.span, context(), ParseErrorKind::BadRelocation(relocation.offset));
            let index = params.checked_add(relocation.local).ok_or_else(bad)?;
            let slot = padded_slot(&mut body, relocation.offset).ok_or_else(bad)?;
            patch_padded_vu32(slot, index);
        }

        if draft.params_pending {
            let func_index = func_index as u32;
            if let Some(entry) = names.local_names.iter_mut().find(|m| m.index == func_index) {
                for name in &mut entry.name_map {
                    name.index += params;
                }
            }
        }

        bound.push(Code {
            locals: draft.locals,
            body,
        });
    }
    let code = bound;

    let export_funcs = export_funcs
        .into_iter()
        .enumerate()
        .map(|(i, export)| -> Result<ExportFunc, FormatError> {
            let context = || format!("module.export[{}].func", i);
            let reference = export
                .func
                .ok_or_else(|| FormatError::new(Span::ZERO, context(), ParseErrorKind::MissingDescription))?;
            Ok(ExportFunc {
                name: export.name,
                func_index: resolve(&reference, func_ids, function_count, Namespace::Func, context)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let start_function = match start_function {
        Some(reference) => Some(resolve(&reference, func_ids, function_count, Namespace::Func, || {
            "module.start".to_string()
        })?),
        None => None,
    };

    log::debug!(
        "bound module: {} types ({} implicit), {} functions",
        type_count,
        type_count - explicit,
        function_count
    );

    Ok(Module {
        types,
        import_funcs,
        type_uses,
        code,
        export_funcs,
        start_function,
        names: if names.is_empty() { None } else { Some(names) },
    })
}

/// The five bytes of a padded LEB128 written at `offset`.
fn padded_slot(body: &mut [u8], offset: usize) -> Option<&mut [u8]> {
    let end = offset.checked_add(PADDED_U32_WIDTH)?;
    body.get_mut(offset..end)
}

/// Looks `reference` up in `ids`, or checks a numeral against `count`.
fn resolve(
    reference: &Reference,
    ids: &IdContext,
    count: u32,
    namespace: Namespace,
    context: impl FnOnce() -> String,
) -> Result<u32, FormatError> {
    let resolved = match &reference.index {
        Index::Numeric(n) if *n < count => Ok(*n),
        Index::Numeric(_) => Err(ParseErrorKind::Unresolved {
            namespace,
            reference: reference.index.to_string(),
        }),
        Index::Id(id) => ids.resolve(id, namespace),
    };
    resolved.map_err(|kind| FormatError::new(reference.span, context(), kind))
}
