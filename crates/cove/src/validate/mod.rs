//! Module validation.
//!
//! Validation is the semantic half of module loading: every index in
//! bounds, every constant initializer in-type, every export name unique,
//! and every function body checked by the stack-polymorphic algorithm in
//! [`func`]. A module that fails validation is never handed to code
//! generation.

mod func;

#[cfg(test)]
mod tests;

use crate::Config;
use core::fmt::{self, Display};
use cove_core::ValType;
use cove_ir::{
    ConstExpr,
    ElemItems,
    ElemSegmentMode,
    ExternIndex,
    Features,
    ImportDesc,
    Module,
};
use std::collections::BTreeSet;

/// A validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The defined-function index the failure occurred in, if any.
    pub function: Option<u32>,
    /// The instruction position within the function body, if any.
    pub position: usize,
    /// Why validation failed.
    pub reason: Reason,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function {
            Some(function) => write!(
                f,
                "validation failed in function {} at instruction {}: {}",
                function, self.position, self.reason
            ),
            None => write!(f, "validation failed: {}", self.reason),
        }
    }
}

impl core::error::Error for ValidationError {}

/// The reason a module or function failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    /// An index referenced a non-existent entry of the given space.
    IndexOutOfBounds {
        /// The index space name, e.g. `"type"` or `"function"`.
        space: &'static str,
        /// The out-of-bounds index.
        index: u32,
    },
    /// An operator is gated behind a disabled feature.
    FeatureDisabled {
        /// The name of the disabled feature.
        feature: &'static str,
    },
    /// The value stack held an unexpected type.
    TypeMismatch {
        /// The expected type.
        expected: ValType,
        /// The found type, `None` if the stack was too short.
        found: Option<ValType>,
    },
    /// The value stack height did not match the block's requirements.
    StackHeightMismatch,
    /// A value was left on or missing from the stack at a block end.
    UnbalancedBlockEnd,
    /// An `else` or `catch` appeared outside an `if`/`try` block.
    MisplacedBlockTerminator,
    /// Instructions followed the function's final `end`.
    TrailingInstructions,
    /// The function body ended while blocks were still open.
    UnclosedBlocks,
    /// A branch label depth exceeded the control stack.
    LabelOutOfBounds {
        /// The requested label depth.
        depth: u32,
    },
    /// `br_table` targets disagree about their arity.
    BranchTableArityMismatch,
    /// The two `select` operands have no common supertype.
    SelectTypeMismatch,
    /// A write targeted an immutable global.
    GlobalIsImmutable,
    /// A constant expression is not of the required form or type.
    InvalidInitializer,
    /// A constant expression reads a non-imported or mutable global.
    InitializerGlobalNotImported,
    /// `ref.func` referenced a function that is never declared.
    FunctionNotDeclared {
        /// The undeclared function index.
        index: u32,
    },
    /// An export name appeared twice.
    DuplicateExportName {
        /// The duplicated name.
        name: String,
    },
    /// Import or export of a mutable global with the feature disabled.
    MutableGlobalTransfer,
    /// The start function is not of type `[] -> []`.
    InvalidStartFunction,
    /// A tag's function type has a non-empty result tuple.
    TagTypeHasResults,
    /// A declared alignment exceeds the access width.
    InvalidAlignment,
    /// An atomic access alignment differs from its access width.
    AtomicAlignmentMismatch,
    /// An atomic access targets an unshared memory while the
    /// shared-requirement flag is on.
    AtomicRequiresSharedMemory,
    /// A lane index is out of range.
    LaneOutOfBounds,
    /// A function declares more locals than the configured maximum.
    TooManyLocals {
        /// The declared number of locals.
        count: u64,
    },
    /// An element segment's type does not fit its table.
    ElementTypeMismatch,
    /// A bulk data operator requires the data-count section.
    MissingDataCount,
    /// A typed `select` must name exactly one result type.
    InvalidSelectArity,
}

impl Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfBounds { space, index } => {
                write!(f, "{space} index {index} is out of bounds")
            }
            Self::FeatureDisabled { feature } => {
                write!(f, "requires the disabled `{feature}` feature")
            }
            Self::TypeMismatch { expected, found } => match found {
                Some(found) => write!(f, "expected {expected} but found {found}"),
                None => write!(f, "expected {expected} but the stack is empty"),
            },
            Self::StackHeightMismatch => write!(f, "stack height does not match the block"),
            Self::UnbalancedBlockEnd => write!(f, "unbalanced stack at block end"),
            Self::MisplacedBlockTerminator => {
                write!(f, "`else`/`catch` outside a matching block")
            }
            Self::TrailingInstructions => write!(f, "instructions after the final `end`"),
            Self::UnclosedBlocks => write!(f, "function body left blocks open"),
            Self::LabelOutOfBounds { depth } => write!(f, "label depth {depth} is out of bounds"),
            Self::BranchTableArityMismatch => write!(f, "br_table targets disagree in arity"),
            Self::SelectTypeMismatch => write!(f, "select operands have no common type"),
            Self::GlobalIsImmutable => write!(f, "cannot write an immutable global"),
            Self::InvalidInitializer => write!(f, "malformed constant initializer"),
            Self::InitializerGlobalNotImported => {
                write!(f, "initializers may only read immutable imported globals")
            }
            Self::FunctionNotDeclared { index } => {
                write!(f, "function {index} is not declared for reference")
            }
            Self::DuplicateExportName { name } => write!(f, "duplicate export name `{name}`"),
            Self::MutableGlobalTransfer => {
                write!(f, "import/export of mutable globals is disabled")
            }
            Self::InvalidStartFunction => write!(f, "start function must have type [] -> []"),
            Self::TagTypeHasResults => write!(f, "exception tag types must not have results"),
            Self::InvalidAlignment => write!(f, "alignment exceeds the access width"),
            Self::AtomicAlignmentMismatch => {
                write!(f, "atomic accesses must be naturally aligned")
            }
            Self::AtomicRequiresSharedMemory => {
                write!(f, "atomic accesses require a shared memory")
            }
            Self::LaneOutOfBounds => write!(f, "lane index is out of bounds"),
            Self::TooManyLocals { count } => {
                write!(f, "function declares {count} locals")
            }
            Self::ElementTypeMismatch => {
                write!(f, "element segment type does not fit its table")
            }
            Self::MissingDataCount => {
                write!(f, "bulk data operators require the data-count section")
            }
            Self::InvalidSelectArity => {
                write!(f, "typed `select` must name exactly one type")
            }
        }
    }
}

/// Context shared by module-level and function-body validation.
pub(crate) struct ModuleContext<'a> {
    pub module: &'a Module,
    pub features: &'a Features,
    /// Function indices usable by `ref.func`.
    pub declared_funcs: BTreeSet<u32>,
}

impl ModuleContext<'_> {
    fn error(&self, reason: Reason) -> ValidationError {
        ValidationError {
            function: None,
            position: 0,
            reason,
        }
    }
}

/// Validates a decoded module against the configuration.
///
/// Collects module-level errors and up to
/// [`Config::max_validation_errors`] function-body failures before giving
/// up.
///
/// # Errors
///
/// All collected [`ValidationError`]s if the module is invalid.
pub fn validate(module: &Module, config: &Config) -> Result<(), Vec<ValidationError>> {
    let features = config.features();
    let mut errors = Vec::new();
    let ctx = ModuleContext {
        module,
        features,
        declared_funcs: collect_declared_funcs(module),
    };

    validate_imports(&ctx, &mut errors);
    validate_definitions(&ctx, &mut errors);
    validate_globals(&ctx, &mut errors);
    validate_exports(&ctx, &mut errors);
    validate_start(&ctx, &mut errors);
    validate_segments(&ctx, &mut errors);

    let mut failed_functions = 0;
    for (index, def) in module.funcs.iter().enumerate() {
        if failed_functions >= config.max_validation_errors() {
            break;
        }
        if let Err(mut error) = func::validate_function(&ctx, config, def) {
            error.function = Some(index as u32);
            errors.push(error);
            failed_functions += 1;
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Collects the functions usable by `ref.func`: those referenced from
/// element segments, global initializers or exports.
fn collect_declared_funcs(module: &Module) -> BTreeSet<u32> {
    let mut declared = BTreeSet::new();
    for segment in &module.elems {
        match &segment.items {
            ElemItems::Funcs(items) => declared.extend(items.iter().copied()),
            ElemItems::Exprs(items) => {
                for item in items {
                    if let ConstExpr::RefFunc(index) = item {
                        declared.insert(*index);
                    }
                }
            }
        }
    }
    for def in &module.globals {
        if let ConstExpr::RefFunc(index) = &def.init {
            declared.insert(*index);
        }
    }
    for export in &module.exports {
        if let ExternIndex::Func(index) = export.index {
            declared.insert(index);
        }
    }
    declared
}

fn check_type_index(ctx: &ModuleContext<'_>, index: u32, errors: &mut Vec<ValidationError>) {
    if ctx.module.types.get(index as usize).is_none() {
        errors.push(ctx.error(Reason::IndexOutOfBounds {
            space: "type",
            index,
        }));
    }
}

fn validate_imports(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    for import in &ctx.module.imports {
        match &import.desc {
            ImportDesc::Func(type_index) => check_type_index(ctx, *type_index, errors),
            ImportDesc::Tag(type_index) => {
                check_type_index(ctx, *type_index, errors);
                if !ctx.features.exceptions {
                    errors.push(ctx.error(Reason::FeatureDisabled {
                        feature: "exception-handling",
                    }));
                }
            }
            ImportDesc::Global(ty) => {
                if ty.mutability().is_mut() && !ctx.features.mutable_global {
                    errors.push(ctx.error(Reason::MutableGlobalTransfer));
                }
            }
            ImportDesc::Memory(ty) => {
                if ty.is_shared() && !ctx.features.atomics {
                    errors.push(ctx.error(Reason::FeatureDisabled { feature: "atomics" }));
                }
            }
            ImportDesc::Table(ty) => {
                if ty.is_shared() && !ctx.features.shared_tables {
                    errors.push(ctx.error(Reason::FeatureDisabled {
                        feature: "shared-tables",
                    }));
                }
                if ty.element() != ValType::FuncRef && !ctx.features.reference_types {
                    errors.push(ctx.error(Reason::FeatureDisabled {
                        feature: "reference-types",
                    }));
                }
            }
        }
    }
}

fn validate_definitions(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    for def in &ctx.module.funcs {
        check_type_index(ctx, def.type_index, errors);
    }
    for tag in &ctx.module.tags {
        check_type_index(ctx, tag.type_index, errors);
        if !ctx.features.exceptions {
            errors.push(ctx.error(Reason::FeatureDisabled {
                feature: "exception-handling",
            }));
        }
        if let Some(ty) = ctx.module.types.get(tag.type_index as usize) {
            if !ty.results().is_empty() {
                errors.push(ctx.error(Reason::TagTypeHasResults));
            }
        }
    }
    for ty in &ctx.module.memories {
        if ty.is_shared() && !ctx.features.atomics {
            errors.push(ctx.error(Reason::FeatureDisabled { feature: "atomics" }));
        }
    }
    for ty in &ctx.module.tables {
        if ty.is_shared() && !ctx.features.shared_tables {
            errors.push(ctx.error(Reason::FeatureDisabled {
                feature: "shared-tables",
            }));
        }
        if ty.element() != ValType::FuncRef && !ctx.features.reference_types {
            errors.push(ctx.error(Reason::FeatureDisabled {
                feature: "reference-types",
            }));
        }
    }
}

/// Checks one constant initializer against its required type.
fn validate_const_expr(
    ctx: &ModuleContext<'_>,
    expr: &ConstExpr,
    required: ValType,
    errors: &mut Vec<ValidationError>,
) {
    let found = match expr {
        ConstExpr::I32(_) => ValType::I32,
        ConstExpr::I64(_) => ValType::I64,
        ConstExpr::F32(_) => ValType::F32,
        ConstExpr::F64(_) => ValType::F64,
        ConstExpr::V128(_) => ValType::V128,
        ConstExpr::RefNull(ty) => *ty,
        ConstExpr::RefFunc(index) => {
            if *index >= ctx.module.num_funcs() {
                errors.push(ctx.error(Reason::IndexOutOfBounds {
                    space: "function",
                    index: *index,
                }));
                return;
            }
            ValType::FuncRef
        }
        ConstExpr::GlobalGet(index) => {
            // Only immutable imported globals are readable here: the
            // initializer runs before any defined global exists.
            let num_imported = ctx.module.num_imported_globals();
            let Some(ty) = ctx.module.global_type(*index) else {
                errors.push(ctx.error(Reason::IndexOutOfBounds {
                    space: "global",
                    index: *index,
                }));
                return;
            };
            if *index >= num_imported || ty.mutability().is_mut() {
                errors.push(ctx.error(Reason::InitializerGlobalNotImported));
                return;
            }
            ty.content()
        }
    };
    if !found.is_subtype_of(&required) {
        errors.push(ctx.error(Reason::InvalidInitializer));
    }
}

fn validate_globals(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    for def in &ctx.module.globals {
        validate_const_expr(ctx, &def.init, def.ty.content(), errors);
    }
}

fn validate_exports(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    let mut seen = BTreeSet::new();
    for export in &ctx.module.exports {
        if !seen.insert(export.name.as_str()) {
            errors.push(ctx.error(Reason::DuplicateExportName {
                name: export.name.clone(),
            }));
        }
        let (space, index, in_bounds) = match export.index {
            ExternIndex::Func(index) => ("function", index, index < ctx.module.num_funcs()),
            ExternIndex::Table(index) => ("table", index, index < ctx.module.num_tables()),
            ExternIndex::Memory(index) => ("memory", index, index < ctx.module.num_memories()),
            ExternIndex::Global(index) => ("global", index, index < ctx.module.num_globals()),
            ExternIndex::Tag(index) => ("tag", index, index < ctx.module.num_tags()),
        };
        if !in_bounds {
            errors.push(ctx.error(Reason::IndexOutOfBounds { space, index }));
            continue;
        }
        if let ExternIndex::Global(index) = export.index {
            let ty = ctx.module.global_type(index).expect("checked above");
            if ty.mutability().is_mut() && !ctx.features.mutable_global {
                errors.push(ctx.error(Reason::MutableGlobalTransfer));
            }
        }
    }
}

fn validate_start(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    let Some(start) = ctx.module.start else {
        return;
    };
    match ctx.module.func_type(start) {
        None => errors.push(ctx.error(Reason::IndexOutOfBounds {
            space: "function",
            index: start,
        })),
        Some(ty) => {
            if !ty.params().is_empty() || !ty.results().is_empty() {
                errors.push(ctx.error(Reason::InvalidStartFunction));
            }
        }
    }
}

fn validate_segments(ctx: &ModuleContext<'_>, errors: &mut Vec<ValidationError>) {
    for segment in &ctx.module.elems {
        if !ctx.features.bulk_memory
            && matches!(
                segment.mode,
                ElemSegmentMode::Passive | ElemSegmentMode::Declared
            )
        {
            errors.push(ctx.error(Reason::FeatureDisabled {
                feature: "bulk-memory",
            }));
        }
        if let ElemSegmentMode::Active { table, offset } = &segment.mode {
            match ctx.module.table_type(*table) {
                None => errors.push(ctx.error(Reason::IndexOutOfBounds {
                    space: "table",
                    index: *table,
                })),
                Some(ty) => {
                    if !segment.ty.is_subtype_of(&ty.element()) {
                        errors.push(ctx.error(Reason::ElementTypeMismatch));
                    }
                }
            }
            validate_const_expr(ctx, offset, ValType::I32, errors);
        }
        match &segment.items {
            ElemItems::Funcs(items) => {
                for index in items {
                    if *index >= ctx.module.num_funcs() {
                        errors.push(ctx.error(Reason::IndexOutOfBounds {
                            space: "function",
                            index: *index,
                        }));
                    }
                }
            }
            ElemItems::Exprs(items) => {
                for item in items {
                    validate_const_expr(ctx, item, segment.ty, errors);
                }
            }
        }
    }

    for segment in &ctx.module.datas {
        match &segment.mode {
            cove_ir::DataSegmentMode::Active { memory, offset } => {
                if ctx.module.memory_type(*memory).is_none() {
                    errors.push(ctx.error(Reason::IndexOutOfBounds {
                        space: "memory",
                        index: *memory,
                    }));
                }
                validate_const_expr(ctx, offset, ValType::I32, errors);
            }
            cove_ir::DataSegmentMode::Passive => {
                if !ctx.features.bulk_memory {
                    errors.push(ctx.error(Reason::FeatureDisabled {
                        feature: "bulk-memory",
                    }));
                }
            }
        }
    }
}
