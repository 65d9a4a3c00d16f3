use std::collections::BTreeMap;

use entangle_decl::{CanonicalType, DeclKind, DeclNode, RecordTag, TypeRef};
use entangle_span::SourceLocation;
use tracing::{debug, trace};

use super::key::{DeclRank, Segment, SymbolKey};
use super::naming::{OperatorName, anonymous_name, check_identifier, operator_dunder};
use crate::error::{BindError, BindResult, Violation};
use crate::filter::{Filter, Parent, Verdict};
use crate::mapper::{Layout, NamedType, TypeResolver};

/// Inheritance facts resolved once every aggregate is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordInfo {
    pub base: Option<SymbolKey>,
    /// 1 for a root class, one more than its base otherwise.
    pub generation: u32,
    /// The class or an ancestor declares a virtual member.
    pub polymorphic: bool,
    /// The class introduces the vtable pointer in its own layout.
    pub vtable_slot: bool,
}

#[derive(Debug, Clone)]
pub struct SymbolEntry {
    pub key: SymbolKey,
    /// Never empty. More than one only for overloaded callables.
    pub decls: Vec<DeclNode>,
    pub record: Option<RecordInfo>,
}

impl SymbolEntry {
    pub fn primary(&self) -> &DeclNode {
        &self.decls[0]
    }

    pub fn location(&self) -> &SourceLocation {
        &self.primary().location
    }

    /// Zero for anything that is not an aggregate.
    pub fn generation(&self) -> u32 {
        self.record.as_ref().map_or(0, |record| record.generation)
    }

    /// Size and alignment the parser reported for an aggregate.
    pub fn reported_layout(&self) -> Option<Layout> {
        match &self.primary().kind {
            DeclKind::Record(decl) => Some(Layout::new(decl.size?, decl.align?)),
            _ => None,
        }
    }
}

/// Bound declarations keyed structurally; read-only once built.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: BTreeMap<SymbolKey, SymbolEntry>,
    by_usr: BTreeMap<String, SymbolKey>,
}

impl SymbolTable {
    pub fn get(&self, key: &SymbolKey) -> Option<&SymbolEntry> {
        self.entries.get(key)
    }

    /// Entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &SymbolEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, named: &TypeRef) -> Option<&SymbolEntry> {
        lookup_key(&self.entries, &self.by_usr, named).and_then(|key| self.entries.get(key))
    }

    /// Bound aggregate named by `ty`, looking through one pointer or reference.
    pub fn aggregate_of(&self, ty: &CanonicalType) -> Option<&SymbolEntry> {
        let named = match ty.indirection() {
            Some((_, pointee)) => pointee.record_ref(),
            None => ty.record_ref(),
        }?;
        self.lookup(named)
            .filter(|entry| entry.key.rank().is_aggregate())
    }
}

impl TypeResolver for SymbolTable {
    fn resolve(&self, named: &TypeRef) -> Option<NamedType> {
        let entry = self.lookup(named)?;
        let path = entry.key.python_path();
        match &entry.primary().kind {
            DeclKind::Enum(decl) => Some(NamedType::Enum {
                path,
                underlying: decl.underlying,
            }),
            DeclKind::Record(_) => Some(NamedType::Aggregate {
                path,
                layout: entry.reported_layout(),
            }),
            _ => None,
        }
    }

    fn bound_names(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| {
                let rank = entry.key.rank();
                rank == DeclRank::Enum || rank.is_aggregate()
            })
            .map(|entry| entry.key.to_string())
            .collect()
    }
}

fn lookup_key<'t>(
    entries: &'t BTreeMap<SymbolKey, SymbolEntry>,
    by_usr: &'t BTreeMap<String, SymbolKey>,
    named: &TypeRef,
) -> Option<&'t SymbolKey> {
    if let Some(key) = by_usr.get(&named.usr) {
        return Some(key);
    }
    // Hand-written declaration dumps may omit identifiers; fall back to the spelling.
    let spelling = named.spelling.trim_start_matches("const ").trim_start_matches("::");
    entries
        .keys()
        .find(|key| {
            (key.rank() == DeclRank::Enum || key.rank().is_aggregate())
                && key.to_string() == spelling
        })
}

/// Collects bound declarations from one or more parsed headers.
pub struct SymbolTableBuilder<'f> {
    filter: Filter<'f>,
    entries: BTreeMap<SymbolKey, SymbolEntry>,
    by_usr: BTreeMap<String, SymbolKey>,
    /// Every name taken in a scope, with the kind that took it first.
    names: BTreeMap<(Vec<Segment>, String), (DeclRank, SourceLocation)>,
    /// Namespaces enclosing the walk, innermost last.
    open_namespaces: Vec<OpenNamespace>,
}

/// A namespace only takes its name once something inside it is bound.
struct OpenNamespace {
    enclosing: Vec<Segment>,
    segment: Segment,
    location: SourceLocation,
    claimed: bool,
}

impl<'f> SymbolTableBuilder<'f> {
    pub fn new(marker: &'f str) -> Self {
        Self {
            filter: Filter::new(marker),
            entries: BTreeMap::new(),
            by_usr: BTreeMap::new(),
            names: BTreeMap::new(),
            open_namespaces: Vec::new(),
        }
    }

    /// Walks a translation unit, inserting everything the filter binds.
    pub fn add_unit(&mut self, root: &DeclNode) -> BindResult<()> {
        let mut scope = Vec::new();
        self.walk(root, &mut scope, Parent::TranslationUnit)
    }

    fn walk(
        &mut self,
        node: &DeclNode,
        scope: &mut Vec<Segment>,
        parent: Parent<'_>,
    ) -> BindResult<()> {
        for child in &node.children {
            match self.filter.classify(child, parent)? {
                Verdict::Skip => {}
                Verdict::Descend => match &child.name {
                    Some(name) => {
                        let segment = Segment::namespace(name.as_str());
                        self.open_namespaces.push(OpenNamespace {
                            enclosing: scope.clone(),
                            segment: segment.clone(),
                            location: child.location.clone(),
                            claimed: false,
                        });
                        scope.push(segment);
                        let walked = self.walk(child, scope, Parent::Namespace);
                        scope.pop();
                        self.open_namespaces.pop();
                        walked?;
                    }
                    // Anonymous namespaces contribute no path segment.
                    None => self.walk(child, scope, Parent::Namespace)?,
                },
                Verdict::Bind { descend } => {
                    let key = self.insert(scope, child)?;
                    if descend {
                        let mut inner = key.as_scope();
                        self.walk(child, &mut inner, Parent::Record { name: key.name() })?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Adds one declaration, merging it with identical earlier ones.
    pub fn insert(&mut self, scope: &[Segment], node: &DeclNode) -> BindResult<SymbolKey> {
        self.claim_open_namespaces()?;
        let rank = rank_of(node)?;
        let name = python_name(node, rank)?;
        if let DeclKind::Enum(decl) = &node.kind {
            for constant in &node.children {
                let Some(constant_name) = &constant.name else {
                    continue;
                };
                check_name(&constant.location, constant_name)?;
                // Unscoped enumerators are re-exported into the enclosing scope.
                if !decl.is_scoped {
                    let export = Segment::new(DeclRank::Enum, constant_name.as_str());
                    self.claim(scope, &export, &constant.location)?;
                }
            }
        }

        let leaf = Segment::new(rank, name);
        self.claim(scope, &leaf, &node.location)?;
        let key = SymbolKey::new(scope.to_vec(), leaf);
        let identity = node.identity();

        match self.entries.get_mut(&key) {
            Some(entry) if entry.decls.iter().any(|decl| decl.identity() == identity) => {
                debug!(symbol = %key, "merged repeated declaration");
            }
            Some(entry) if !rank.is_callable() => {
                return Err(BindError::new(
                    node.location.clone(),
                    Violation::ConflictingDefinition {
                        path: key.to_string(),
                    },
                )
                .with_related([entry.location().clone()]));
            }
            Some(entry) => {
                trace!(symbol = %key, overloads = entry.decls.len() + 1, "added overload");
                entry.decls.push(node.clone());
            }
            None => {
                trace!(symbol = %key, "inserted");
                if !rank.is_callable() {
                    self.by_usr.insert(identity, key.clone());
                }
                self.entries.insert(
                    key.clone(),
                    SymbolEntry {
                        key: key.clone(),
                        decls: vec![node.clone()],
                        record: None,
                    },
                );
            }
        }
        Ok(key)
    }

    fn claim_open_namespaces(&mut self) -> BindResult<()> {
        let pending: Vec<(Vec<Segment>, Segment, SourceLocation)> = self
            .open_namespaces
            .iter_mut()
            .filter(|open| !open.claimed)
            .map(|open| {
                open.claimed = true;
                (open.enclosing.clone(), open.segment.clone(), open.location.clone())
            })
            .collect();
        for (enclosing, segment, location) in pending {
            check_name(&location, &segment.name)?;
            self.claim(&enclosing, &segment, &location)?;
        }
        Ok(())
    }

    /// Records which kind owns `segment.name` in `scope`, rejecting a second kind.
    fn claim(
        &mut self,
        scope: &[Segment],
        segment: &Segment,
        location: &SourceLocation,
    ) -> BindResult<()> {
        let slot = (scope.to_vec(), segment.name.clone());
        match self.names.get(&slot) {
            Some((existing, _)) if *existing == segment.rank => Ok(()),
            Some((existing, first)) => Err(BindError::new(
                location.clone(),
                Violation::NamingConflict {
                    path: SymbolKey::new(scope.to_vec(), segment.clone()).to_string(),
                    existing: existing.describe(),
                    incoming: segment.rank.describe(),
                },
            )
            .with_related([first.clone()])),
            None => {
                self.names.insert(slot, (segment.rank, location.clone()));
                Ok(())
            }
        }
    }

    /// Resolves inheritance and freezes the table.
    pub fn finish(mut self) -> BindResult<SymbolTable> {
        let aggregates: Vec<SymbolKey> = self
            .entries
            .keys()
            .filter(|key| key.rank().is_aggregate())
            .cloned()
            .collect();
        let mut resolved: BTreeMap<SymbolKey, RecordInfo> = BTreeMap::new();
        for key in &aggregates {
            self.resolve_record(key, &mut resolved, &mut Vec::new())?;
        }
        for (key, info) in resolved {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.record = Some(info);
            }
        }
        debug!(entries = self.entries.len(), "symbol table complete");
        Ok(SymbolTable {
            entries: self.entries,
            by_usr: self.by_usr,
        })
    }

    fn resolve_record(
        &self,
        key: &SymbolKey,
        resolved: &mut BTreeMap<SymbolKey, RecordInfo>,
        visiting: &mut Vec<SymbolKey>,
    ) -> BindResult<RecordInfo> {
        if let Some(info) = resolved.get(key) {
            return Ok(info.clone());
        }
        let Some(entry) = self.entries.get(key) else {
            return Err(BindError::new(
                SourceLocation::unknown(),
                Violation::ScopeOrder {
                    detail: format!("`{key}` vanished while resolving bases"),
                },
            ));
        };
        if visiting.contains(key) {
            return Err(BindError::new(
                entry.location().clone(),
                Violation::LayoutCycle {
                    name: key.to_string(),
                    through: "its base classes".to_string(),
                },
            ));
        }
        let decl = entry.primary();
        let base_decl = decl.children.iter().find_map(|child| match &child.kind {
            DeclKind::BaseSpecifier(base) => Some((child, base)),
            _ => None,
        });

        visiting.push(key.clone());
        let base = match base_decl {
            Some((node, base)) => {
                let base_key = base
                    .ty
                    .canonical
                    .record_ref()
                    .and_then(|named| lookup_key(&self.entries, &self.by_usr, named))
                    .filter(|base_key| base_key.rank().is_aggregate())
                    .cloned()
                    .ok_or_else(|| {
                        BindError::new(
                            node.location.clone(),
                            Violation::UnresolvedBase {
                                name: key.to_string(),
                                base: base.ty.spelling.clone(),
                            },
                        )
                    })?;
                let info = self.resolve_record(&base_key, resolved, visiting)?;
                Some((base_key, info))
            }
            None => None,
        };
        visiting.pop();

        let declares_virtual = decl.children.iter().any(|child| {
            child
                .callable()
                .is_some_and(|callable| callable.is_virtual || callable.is_pure_virtual)
        });
        let inherited = base.as_ref().is_some_and(|(_, info)| info.polymorphic);
        let info = RecordInfo {
            generation: base.as_ref().map_or(1, |(_, info)| info.generation + 1),
            base: base.map(|(base_key, _)| base_key),
            polymorphic: declares_virtual || inherited,
            vtable_slot: declares_virtual && !inherited,
        };
        resolved.insert(key.clone(), info.clone());
        Ok(info)
    }
}

fn rank_of(node: &DeclNode) -> BindResult<DeclRank> {
    let rank = match &node.kind {
        DeclKind::Enum(_) => DeclRank::Enum,
        DeclKind::Function(_) => DeclRank::Function,
        DeclKind::Record(decl) if decl.tag == RecordTag::Class => DeclRank::Class,
        DeclKind::Record(_) => DeclRank::Struct,
        DeclKind::Constructor(_) => DeclRank::Constructor,
        DeclKind::Destructor(_) => DeclRank::Destructor,
        DeclKind::Method(_) => DeclRank::Method,
        other => {
            return Err(BindError::new(
                node.location.clone(),
                Violation::UnsupportedDeclaration {
                    name: node.name_or("<anonymous>").to_string(),
                    description: other.describe().to_string(),
                },
            ));
        }
    };
    Ok(rank)
}

/// The attribute name a bound declaration gets in Python.
fn python_name(node: &DeclNode, rank: DeclRank) -> BindResult<String> {
    match rank {
        DeclRank::Constructor => return Ok("__init__".to_string()),
        DeclRank::Destructor => return Ok("__del__".to_string()),
        _ => {}
    }
    let Some(name) = node.name.as_deref() else {
        if rank == DeclRank::Enum {
            let seed = node
                .usr
                .clone()
                .unwrap_or_else(|| format!("{}@{}", node.identity(), node.location));
            return Ok(anonymous_name(&seed));
        }
        return Err(BindError::new(
            node.location.clone(),
            Violation::Anonymous {
                kind: node.kind.describe(),
            },
        ));
    };
    if rank == DeclRank::Method {
        let arity = node.callable().map_or(0, |callable| callable.params.len());
        match operator_dunder(name, arity) {
            OperatorName::Dunder(dunder) => return Ok(dunder.to_string()),
            OperatorName::Unsupported => {
                return Err(BindError::new(
                    node.location.clone(),
                    Violation::UnsupportedOperator {
                        name: name.to_string(),
                    },
                ));
            }
            OperatorName::NotOperator => {}
        }
    }
    check_name(&node.location, name)?;
    Ok(name.to_string())
}

fn check_name(location: &SourceLocation, name: &str) -> BindResult<()> {
    check_identifier(name).map_err(|reason| {
        BindError::new(
            location.clone(),
            Violation::ReservedIdentifier {
                name: name.to_string(),
                reason,
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use entangle_decl::{EnumValue, Fundamental, Param, QualType};

    use super::*;

    const MARK: &str = "entanglement";

    fn int() -> QualType {
        QualType::fundamental(Fundamental::Int)
    }

    fn unit(children: Vec<DeclNode>) -> DeclNode {
        DeclNode::translation_unit("api.hpp").with_children(children)
    }

    fn build(units: &[DeclNode]) -> BindResult<SymbolTable> {
        let mut builder = SymbolTableBuilder::new(MARK);
        for root in units {
            builder.add_unit(root)?;
        }
        builder.finish()
    }

    fn widget() -> DeclNode {
        DeclNode::record(RecordTag::Class, "Widget", 4, 4)
            .with_usr("c:@N@ns@S@Widget")
            .annotated(MARK)
            .child(DeclNode::field("m_x", int()))
            .child(
                DeclNode::method("size", Vec::new(), int())
                    .with_mangled("_ZN2ns6Widget4sizeEv")
                    .annotated(MARK),
            )
    }

    #[test]
    fn reinserting_identical_declarations_is_idempotent() -> BindResult<()> {
        let header = unit(vec![DeclNode::namespace("ns").child(widget())]);
        let once = build(std::slice::from_ref(&header))?;
        let twice = build(&[header.clone(), header])?;
        assert_eq!(once.len(), 2);
        assert_eq!(twice.len(), 2);
        for entry in twice.entries() {
            assert_eq!(entry.decls.len(), 1, "{} was duplicated", entry.key);
        }
        Ok(())
    }

    #[test]
    fn overloads_share_one_entry() -> BindResult<()> {
        let overload = |symbol: &str, params: Vec<Param>| {
            DeclNode::function("fn1", params, int())
                .with_mangled(symbol)
                .annotated(MARK)
        };
        let table = build(&[unit(vec![
            overload("_Z3fn1v", Vec::new()),
            overload("_Z3fn1i", vec![Param::new("x", int())]),
        ])])?;
        let entry = table.entries().next().map(|entry| entry.decls.len());
        assert_eq!(entry, Some(2));
        Ok(())
    }

    #[test]
    fn a_name_cannot_change_kind() {
        let result = build(&[unit(vec![
            DeclNode::function("thing", Vec::new(), int()).annotated(MARK),
            DeclNode::record(RecordTag::Struct, "thing", 4, 4)
                .annotated(MARK)
                .child(DeclNode::field("x", int())),
        ])]);
        assert!(matches!(
            result.map(|_| ()).map_err(|error| error.violation),
            Err(Violation::NamingConflict { existing: "function", incoming: "struct", .. })
        ));
    }

    #[test]
    fn namespaces_without_bound_members_take_no_name() -> BindResult<()> {
        let helper = DeclNode::function("helper", Vec::new(), int()).with_mangled("_ZN2os6helperEv");
        let table = build(&[unit(vec![
            DeclNode::namespace("os").child(helper.clone()),
            DeclNode::namespace("__detail").child(helper),
            DeclNode::namespace("api").child(DeclNode::namespace("None")),
            DeclNode::function("api", Vec::new(), int())
                .with_mangled("_Z3apiv")
                .annotated(MARK),
        ])])?;
        let keys: Vec<String> = table.entries().map(|entry| entry.key.to_string()).collect();
        assert_eq!(keys, vec!["api"]);
        Ok(())
    }

    #[test]
    fn namespaces_are_checked_once_they_hold_a_binding() {
        let result = build(&[unit(vec![DeclNode::namespace("os").child(
            DeclNode::function("helper", Vec::new(), int())
                .with_mangled("_ZN2os6helperEv")
                .annotated(MARK),
        )])]);
        assert!(matches!(
            result.map(|_| ()).map_err(|error| error.violation),
            Err(Violation::ReservedIdentifier { ref name, .. }) if name == "os"
        ));
    }

    #[test]
    fn differing_definitions_conflict() {
        let first = DeclNode::record(RecordTag::Struct, "P", 4, 4)
            .with_usr("c:@S@P")
            .annotated(MARK)
            .child(DeclNode::field("x", int()));
        let second = DeclNode::record(RecordTag::Struct, "P", 8, 4)
            .with_usr("c:@S@P2")
            .annotated(MARK)
            .child(DeclNode::field("x", int()));
        let result = build(&[unit(vec![first]), unit(vec![second])]);
        assert!(matches!(
            result.map(|_| ()).map_err(|error| error.violation),
            Err(Violation::ConflictingDefinition { .. })
        ));
    }

    #[test]
    fn members_are_normalized() -> BindResult<()> {
        let class = DeclNode::record(RecordTag::Class, "Vec2", 8, 4)
            .annotated(MARK)
            .child(DeclNode::field("x", int()))
            .child(DeclNode::constructor("Vec2", Vec::new()).annotated(MARK))
            .child(DeclNode::destructor("Vec2").annotated(MARK))
            .child(
                DeclNode::method(
                    "operator+",
                    vec![Param::new("other", QualType::record("c:@S@Vec2", "Vec2"))],
                    QualType::record("c:@S@Vec2", "Vec2"),
                )
                .annotated(MARK),
            )
            .child(DeclNode::method("operator-", Vec::new(), int()).annotated(MARK));
        let table = build(&[unit(vec![class])])?;
        let names: Vec<String> = table.entries().map(|entry| entry.key.python_path()).collect();
        assert_eq!(
            names,
            vec![
                "Vec2",
                "Vec2.__init__",
                "Vec2.__del__",
                "Vec2.__add__",
                "Vec2.__neg__",
            ]
        );
        Ok(())
    }

    #[test]
    fn reserved_names_are_fatal() {
        let bad_constant = DeclNode::enumeration(Some("Color"), Fundamental::Int, false)
            .annotated(MARK)
            .child(DeclNode::enum_constant("None", EnumValue::Signed(0)));
        let result = build(&[unit(vec![bad_constant])]);
        assert!(matches!(
            result.map(|_| ()).map_err(|error| error.violation),
            Err(Violation::ReservedIdentifier { reason: "Python keyword", .. })
        ));
    }

    #[test]
    fn inheritance_is_resolved_on_finish() -> BindResult<()> {
        let shape = DeclNode::record(RecordTag::Class, "Shape", 16, 8)
            .with_usr("c:@S@Shape")
            .annotated(MARK)
            .child(DeclNode::field("id", int()))
            .child(
                DeclNode::method("area", Vec::new(), int())
                    .annotated(MARK)
                    .with_callable(|callable| callable.is_virtual = true),
            );
        let square = DeclNode::record(RecordTag::Class, "Square", 24, 8)
            .with_usr("c:@S@Square")
            .annotated(MARK)
            .child(DeclNode::base(QualType::record("c:@S@Shape", "Shape")))
            .child(DeclNode::field("side", int()));
        let table = build(&[unit(vec![square, shape])])?;

        let info = |usr: &str| {
            table
                .lookup(&TypeRef::new(usr, ""))
                .and_then(|entry| entry.record.clone())
        };
        let shape = info("c:@S@Shape");
        let square = info("c:@S@Square");
        assert_eq!(shape.as_ref().map(|i| (i.generation, i.vtable_slot)), Some((1, true)));
        assert_eq!(square.as_ref().map(|i| (i.generation, i.vtable_slot, i.polymorphic)), Some((2, false, true)));
        assert_eq!(
            square.and_then(|i| i.base).map(|key| key.python_path()),
            Some("Shape".to_string())
        );
        Ok(())
    }

    #[test]
    fn unbound_base_is_fatal() {
        let derived = DeclNode::record(RecordTag::Struct, "D", 8, 4)
            .annotated(MARK)
            .child(DeclNode::base(QualType::record("c:@S@Hidden", "Hidden")))
            .child(DeclNode::field("x", int()));
        let result = build(&[unit(vec![derived])]);
        assert!(matches!(
            result.map(|_| ()).map_err(|error| error.violation),
            Err(Violation::UnresolvedBase { .. })
        ));
    }

    #[test]
    fn anonymous_enums_get_hashed_names() -> BindResult<()> {
        let anonymous = DeclNode::enumeration(None, Fundamental::Int, false)
            .with_usr("c:@Ea@FLAG_A")
            .annotated(MARK)
            .child(DeclNode::enum_constant("FLAG_A", EnumValue::Signed(1)));
        let table = build(&[unit(vec![DeclNode::namespace("ns").child(anonymous)])])?;
        let path = table.entries().next().map(|entry| entry.key.python_path());
        assert_eq!(path, Some(format!("ns.{}", anonymous_name("c:@Ea@FLAG_A"))));
        Ok(())
    }
}
