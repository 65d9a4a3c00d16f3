//! Structure layouts: `_fields_` for every bound aggregate, emitted after
//! all classes exist and ordered so each field type is complete first.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use entangle_decl::{CanonicalType, DeclKind, DeclNode, Fundamental};
use tracing::{debug, trace};

use super::writer::{CodeWriter, py_str};
use crate::error::{BindError, BindResult, Violation};
use crate::mapper::{Layout, Purpose, TypeMapper};
use crate::symbols::naming::check_identifier;
use crate::symbols::{SymbolEntry, SymbolKey, SymbolTable};

/// One entry of `_fields_`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPlan {
    pub name: String,
    pub ffi: String,
    pub bits: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateLayout {
    pub base: Option<String>,
    pub fields: Vec<FieldPlan>,
    pub layout: Layout,
    /// Bytes up to the end of the last field, before any tail padding.
    pub data_size: u64,
}

/// Accumulates fields the way the Itanium C++ ABI places them.
///
/// Arithmetic saturates so absurd reported sizes surface as a size mismatch.
#[derive(Debug, Default, Clone)]
struct LayoutBuilder {
    bits: u64,
    align: u64,
}

impl LayoutBuilder {
    /// Places a field and returns its offset in bits.
    fn field(&mut self, layout: Layout) -> u64 {
        let offset = round_up(self.bits, layout.align.saturating_mul(8));
        self.bits = offset.saturating_add(layout.size.saturating_mul(8));
        self.align = self.align.max(layout.align);
        offset
    }

    fn bit_field(&mut self, layout: Layout, width: u32) -> u64 {
        let width = u64::from(width);
        let unit = layout.size.saturating_mul(8);
        if width == 0 {
            self.bits = round_up(self.bits, layout.align.saturating_mul(8));
            return self.bits;
        }
        // A bit-field never straddles a boundary of its declared type.
        if unit > 0 && self.bits / unit != self.bits.saturating_add(width - 1) / unit {
            self.bits = round_up(self.bits, layout.align.saturating_mul(8));
        }
        let offset = self.bits;
        self.bits = self.bits.saturating_add(width);
        self.align = self.align.max(layout.align);
        offset
    }

    fn data_size(&self) -> u64 {
        self.bits.div_ceil(8)
    }

    fn finish(&self) -> Layout {
        let align = self.align.max(1);
        Layout::new(round_up(self.data_size(), align), align)
    }
}

fn round_up(value: u64, multiple: u64) -> u64 {
    if multiple == 0 {
        value
    } else {
        value.div_ceil(multiple).saturating_mul(multiple)
    }
}

/// A data member waiting to be placed.
struct Slot<'n> {
    node: &'n DeclNode,
    name: String,
    layout: Layout,
    bit_width: Option<u32>,
    reported_offset: Option<u64>,
}

fn place(builder: &mut LayoutBuilder, slots: &[Slot<'_>]) -> Vec<u64> {
    slots
        .iter()
        .map(|slot| match slot.bit_width {
            Some(width) => builder.bit_field(slot.layout, width),
            None => builder.field(slot.layout),
        })
        .collect()
}

/// Whether the Itanium ABI may place derived members in the tail padding of
/// `entry`, i.e. the class is not POD for the purpose of layout.
fn reuses_tail_padding(entry: &SymbolEntry) -> bool {
    let info = entry.record.as_ref();
    if info.is_some_and(|info| info.polymorphic || info.base.is_some()) {
        return true;
    }
    entry.primary().children.iter().any(|child| match &child.kind {
        DeclKind::Constructor(_) | DeclKind::Destructor(_) => true,
        DeclKind::Field(_) => !child.access.is_public(),
        _ => false,
    })
}

pub fn plan_layout(
    entry: &SymbolEntry,
    table: &SymbolTable,
    mapper: &TypeMapper<'_>,
) -> BindResult<AggregateLayout> {
    let node = entry.primary();
    let name = entry.key.to_string();
    let fail = |violation| BindError::new(node.location.clone(), violation);
    let reported = entry.reported_layout().ok_or_else(|| {
        fail(Violation::MissingLayoutSize { name: name.clone() })
    })?;

    let mut builder = LayoutBuilder::default();
    let mut fields = Vec::new();
    let info = entry.record.as_ref();

    if info.is_some_and(|info| info.vtable_slot) {
        builder.field(mapper.abi().pointer);
        fields.push(FieldPlan {
            name: "_entangle_vtable".to_string(),
            ffi: "ctypes.c_void_p".to_string(),
            bits: None,
        });
    }

    let mut base = None;
    // Where derived members would start if the base's tail padding were reused.
    let mut reuse_start = None;
    if let Some(base_key) = info.and_then(|info| info.base.as_ref()) {
        let base_entry = table.get(base_key);
        let base_layout = base_entry
            .and_then(SymbolEntry::reported_layout)
            .ok_or_else(|| fail(Violation::MissingLayoutSize { name: base_key.to_string() }))?;
        let base_offset = builder.field(base_layout);
        if let Some(base_entry) = base_entry.filter(|base_entry| reuses_tail_padding(base_entry)) {
            let data_size = plan_layout(base_entry, table, mapper)?.data_size;
            if data_size < base_layout.size {
                let mut alternative = builder.clone();
                alternative.bits = base_offset.saturating_add(data_size.saturating_mul(8));
                reuse_start = Some(alternative);
            }
        }
        let path = base_key.python_path();
        fields.push(FieldPlan {
            name: "_entangle_base".to_string(),
            ffi: path.clone(),
            bits: None,
        });
        base = Some(path);
    }

    let mut slots = Vec::new();
    let mut padding = 0;
    for child in &node.children {
        let DeclKind::Field(field) = &child.kind else {
            continue;
        };
        let canonical = &field.ty.canonical;
        let field_name = match &child.name {
            Some(field_name) => {
                check_identifier(field_name).map_err(|reason| {
                    BindError::new(
                        child.location.clone(),
                        Violation::ReservedIdentifier {
                            name: field_name.clone(),
                            reason,
                        },
                    )
                })?;
                field_name.clone()
            }
            None if field.bit_width.is_some() => {
                padding += 1;
                format!("_entangle_padding{padding}")
            }
            None => {
                return Err(BindError::new(
                    child.location.clone(),
                    Violation::Anonymous { kind: "field" },
                ));
            }
        };
        let type_error = |error| {
            BindError::new(
                child.location.clone(),
                Violation::Type {
                    context: format!("field `{field_name}` of `{name}`"),
                    error,
                },
            )
        };
        let layout = mapper.field_layout(canonical).map_err(type_error)?;

        match field.bit_width {
            Some(width) => {
                let ffi = bit_field_type(canonical, mapper, table).ok_or_else(|| {
                    BindError::new(
                        child.location.clone(),
                        Violation::InvalidBitField {
                            name: name.clone(),
                            field: field_name.clone(),
                        },
                    )
                })?;
                // ctypes has no zero-width fields; the builder still aligns for them.
                if width > 0 {
                    fields.push(FieldPlan {
                        name: field_name.clone(),
                        ffi,
                        bits: Some(width),
                    });
                }
            }
            None => {
                let ffi = mapper
                    .map(canonical, Purpose::AggregateField)
                    .map_err(type_error)?;
                fields.push(FieldPlan {
                    name: field_name.clone(),
                    ffi,
                    bits: None,
                });
            }
        }
        slots.push(Slot {
            node: child,
            name: field_name,
            layout,
            bit_width: field.bit_width,
            reported_offset: field.offset_bits,
        });
    }

    if fields.is_empty() {
        return Err(fail(Violation::EmptyAggregate { name }));
    }
    let offsets = place(&mut builder, &slots);

    if let (Some(mut alternative), Some(base)) = (reuse_start, &base) {
        if place(&mut alternative, &slots) != offsets {
            return Err(fail(Violation::TailPaddingReuse {
                name,
                base: base.clone(),
            }));
        }
    }
    for (slot, &computed) in slots.iter().zip(&offsets) {
        if let Some(reported) = slot.reported_offset.filter(|&reported| reported != computed) {
            return Err(BindError::new(
                slot.node.location.clone(),
                Violation::FieldOffsetMismatch {
                    name: name.clone(),
                    field: slot.name.clone(),
                    computed,
                    reported,
                },
            ));
        }
    }

    let computed = builder.finish();
    trace!(aggregate = %name, size = computed.size, align = computed.align, "computed layout");
    if computed.size != reported.size {
        return Err(fail(Violation::LayoutSizeMismatch {
            name,
            computed: computed.size,
            reported: reported.size,
        }));
    }
    Ok(AggregateLayout {
        base,
        fields,
        layout: reported,
        data_size: builder.data_size(),
    })
}

/// Integer `ctypes` type usable in a bit-field for `ty`.
fn bit_field_type(
    ty: &CanonicalType,
    mapper: &TypeMapper<'_>,
    table: &SymbolTable,
) -> Option<String> {
    let kind = match ty {
        CanonicalType::Fundamental(kind) => *kind,
        CanonicalType::Enum(named) => match &table.lookup(named)?.primary().kind {
            DeclKind::Enum(decl) => decl.underlying,
            _ => return None,
        },
        _ => return None,
    };
    match kind {
        // ctypes only accepts integer types here.
        Fundamental::Bool => Some("ctypes.c_uint8".to_string()),
        Fundamental::Char => Some("ctypes.c_int8".to_string()),
        kind if kind.is_integer() && kind != Fundamental::WChar => Some(mapper.ffi_name(kind)),
        _ => None,
    }
}

/// Aggregates ordered so every base and by-value field type precedes its user.
pub fn layout_order(table: &SymbolTable) -> BindResult<Vec<&SymbolEntry>> {
    let aggregates: BTreeMap<&SymbolKey, &SymbolEntry> = table
        .entries()
        .filter(|entry| entry.key.rank().is_aggregate())
        .map(|entry| (&entry.key, entry))
        .collect();

    let mut pending: BTreeMap<&SymbolKey, BTreeSet<&SymbolKey>> = BTreeMap::new();
    let mut users: BTreeMap<&SymbolKey, Vec<&SymbolKey>> = BTreeMap::new();
    for (key, entry) in &aggregates {
        let dependencies = dependencies_of(entry, table);
        for dependency in &dependencies {
            users.entry(*dependency).or_default().push(*key);
        }
        pending.insert(*key, dependencies);
    }

    let mut ready: BinaryHeap<Reverse<(u32, &SymbolKey)>> = pending
        .iter()
        .filter(|(_, dependencies)| dependencies.is_empty())
        .map(|(key, _)| Reverse((aggregates[key].generation(), *key)))
        .collect();
    let mut ordered = Vec::with_capacity(aggregates.len());
    while let Some(Reverse((_, key))) = ready.pop() {
        ordered.push(aggregates[key]);
        for user in users.get(key).into_iter().flatten() {
            if let Some(dependencies) = pending.get_mut(user) {
                dependencies.remove(key);
                if dependencies.is_empty() {
                    ready.push(Reverse((aggregates[user].generation(), *user)));
                }
            }
        }
    }

    if ordered.len() != aggregates.len() {
        let placed: BTreeSet<&SymbolKey> = ordered.iter().map(|entry| &entry.key).collect();
        if let Some((key, dependencies)) = pending
            .iter()
            .find(|(key, _)| !placed.contains(*key))
        {
            let through = dependencies
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(BindError::new(
                aggregates[key].location().clone(),
                Violation::LayoutCycle {
                    name: key.to_string(),
                    through,
                },
            ));
        }
    }
    Ok(ordered)
}

fn dependencies_of<'t>(entry: &'t SymbolEntry, table: &'t SymbolTable) -> BTreeSet<&'t SymbolKey> {
    let mut dependencies = BTreeSet::new();
    if let Some(base) = entry.record.as_ref().and_then(|info| info.base.as_ref()) {
        dependencies.insert(base);
    }
    for child in &entry.primary().children {
        if let DeclKind::Field(field) = &child.kind {
            let mut ty = &field.ty.canonical;
            while let CanonicalType::ConstantArray { element, .. } = ty {
                ty = element;
            }
            if let Some(named) = ty.record_ref() {
                if let Some(target) = table.lookup(named) {
                    if target.key.rank().is_aggregate() && target.key != entry.key {
                        dependencies.insert(&target.key);
                    }
                }
            }
        }
    }
    dependencies
}

pub fn emit_layouts(table: &SymbolTable, mapper: &TypeMapper<'_>) -> BindResult<String> {
    let mut w = CodeWriter::new();
    let ordered = layout_order(table)?;
    debug!(aggregates = ordered.len(), "emitting layouts");
    for entry in ordered {
        let plan = plan_layout(entry, table, mapper)?;
        write_layout(&mut w, &entry.key.python_path(), &plan);
    }
    Ok(w.finish())
}

fn write_layout(w: &mut CodeWriter, path: &str, plan: &AggregateLayout) {
    if let Some(base) = &plan.base {
        w.line(format!("{path}._entangle_base_ = {base}"));
        w.line(format!("{path}._anonymous_ = ('_entangle_base',)"));
    }
    w.line(format!("{path}._fields_ = ["));
    w.indent();
    for field in &plan.fields {
        match field.bits {
            Some(bits) => w.line(format!("({}, {}, {bits}),", py_str(&field.name), field.ffi)),
            None => w.line(format!("({}, {}),", py_str(&field.name), field.ffi)),
        }
    }
    w.dedent();
    w.line("]");
    let size = plan.layout.size;
    w.line(format!("if ctypes.sizeof({path}) != {size}:"));
    w.indent();
    w.line(format!(
        "raise _entangle_builtins.ImportError(f'entangle: {path} is {{ctypes.sizeof({path})}} bytes but the C++ type is {size} bytes')"
    ));
    w.dedent();
    w.blank();
}
