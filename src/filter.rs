//! Decides, per declaration, whether it is bound, skipped or rejected.
//!
//! Binding is opt-in: only declarations carrying the annotation marker are
//! considered, and a marked declaration that cannot be represented is an
//! error rather than a silent omission.

use entangle_decl::{Callable, DeclKind, DeclNode, Linkage, RecordTag, TemplateKind};
use tracing::debug;

use crate::error::{BindError, BindResult, Violation};
use crate::symbols::naming::{OperatorName, operator_dunder};

/// Where the declaration being classified sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent<'a> {
    TranslationUnit,
    Namespace,
    Record { name: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Not part of the binding.
    Skip,
    /// A scope whose children are classified in turn.
    Descend,
    /// Bound; `descend` when its members need classifying too.
    Bind { descend: bool },
}

pub struct Filter<'a> {
    marker: &'a str,
}

impl<'a> Filter<'a> {
    pub fn new(marker: &'a str) -> Self {
        Self { marker }
    }

    pub fn marker(&self) -> &str {
        self.marker
    }

    pub fn classify(&self, node: &DeclNode, parent: Parent<'_>) -> BindResult<Verdict> {
        let marked = node.is_marked(self.marker);
        let name = node.name_or("<anonymous>");
        let fail = |violation| Err(BindError::new(node.location.clone(), violation));

        match &node.kind {
            DeclKind::TranslationUnit | DeclKind::Namespace => Ok(Verdict::Descend),
            DeclKind::Enum(decl) => {
                if !marked {
                    return Ok(Verdict::Skip);
                }
                if !decl.is_definition {
                    debug!(name, "skipping enum forward declaration");
                    return Ok(Verdict::Skip);
                }
                if !node.access.is_public() {
                    return fail(Violation::NotPublic {
                        name: name.to_string(),
                        kind: "enum",
                    });
                }
                let has_constants = node
                    .children
                    .iter()
                    .any(|child| matches!(child.kind, DeclKind::EnumConstant(_)));
                if !has_constants {
                    return fail(Violation::EmptyEnum {
                        name: name.to_string(),
                    });
                }
                Ok(Verdict::Bind { descend: false })
            }
            DeclKind::Record(decl) => {
                if !marked {
                    self.reject_marked_members(node)?;
                    return Ok(Verdict::Skip);
                }
                if !decl.is_definition {
                    debug!(name, "skipping forward declaration");
                    return Ok(Verdict::Skip);
                }
                if node.name.is_none() {
                    return fail(Violation::Anonymous {
                        kind: node.kind.describe(),
                    });
                }
                if decl.tag == RecordTag::Union {
                    return fail(Violation::Union {
                        name: name.to_string(),
                    });
                }
                if !node.access.is_public() {
                    return fail(Violation::NotPublic {
                        name: name.to_string(),
                        kind: node.kind.describe(),
                    });
                }
                let bases: Vec<_> = node
                    .children
                    .iter()
                    .filter_map(|child| match &child.kind {
                        DeclKind::BaseSpecifier(base) => Some(base),
                        _ => None,
                    })
                    .collect();
                if bases.len() > 1 {
                    return fail(Violation::MultipleInheritance {
                        name: name.to_string(),
                        count: bases.len(),
                    });
                }
                if bases.iter().any(|base| base.is_virtual) {
                    return fail(Violation::VirtualInheritance {
                        name: name.to_string(),
                    });
                }
                Ok(Verdict::Bind { descend: true })
            }
            DeclKind::Function(callable) => {
                if !marked {
                    return Ok(Verdict::Skip);
                }
                if operator_dunder(name, callable.params.len()) != OperatorName::NotOperator {
                    return fail(Violation::FreeOperator {
                        name: name.to_string(),
                    });
                }
                check_callable(node, callable)?;
                Ok(Verdict::Bind { descend: false })
            }
            DeclKind::Constructor(callable)
            | DeclKind::Destructor(callable)
            | DeclKind::Method(callable) => {
                // Out-of-line definitions repeat the member outside its class.
                if !matches!(parent, Parent::Record { .. }) || !marked {
                    return Ok(Verdict::Skip);
                }
                if callable.is_pure_virtual {
                    debug!(name, "skipping pure virtual method");
                    return Ok(Verdict::Skip);
                }
                if !node.access.is_public() {
                    return fail(Violation::NotPublic {
                        name: name.to_string(),
                        kind: node.kind.describe(),
                    });
                }
                check_callable(node, callable)?;
                Ok(Verdict::Bind { descend: false })
            }
            DeclKind::Template(template) if marked => fail(Violation::Template {
                name: name.to_string(),
                what: match template.template {
                    TemplateKind::ClassTemplate => "class template",
                    TemplateKind::FunctionTemplate => "function template",
                    TemplateKind::PartialSpecialization => "partial specialization",
                },
            }),
            DeclKind::Other(other) if marked => fail(Violation::UnsupportedDeclaration {
                name: name.to_string(),
                description: other.description.clone(),
            }),
            DeclKind::EnumConstant(_)
            | DeclKind::Field(_)
            | DeclKind::BaseSpecifier(_)
            | DeclKind::Template(_)
            | DeclKind::Other(_) => Ok(Verdict::Skip),
        }
    }

    /// A marked member of an unmarked record would silently vanish.
    fn reject_marked_members(&self, record: &DeclNode) -> BindResult<()> {
        let owner = record.name_or("<anonymous>");
        for child in &record.children {
            let bindable = matches!(
                child.kind,
                DeclKind::Enum(_)
                    | DeclKind::Record(_)
                    | DeclKind::Constructor(_)
                    | DeclKind::Destructor(_)
                    | DeclKind::Method(_)
                    | DeclKind::Function(_)
                    | DeclKind::Template(_)
            );
            if bindable && child.is_marked(self.marker) {
                return Err(BindError::new(
                    child.location.clone(),
                    Violation::UnmarkedOwner {
                        name: child.name_or("<anonymous>").to_string(),
                        kind: child.kind.describe(),
                        owner: owner.to_string(),
                    },
                ));
            }
        }
        Ok(())
    }
}

fn check_callable(node: &DeclNode, callable: &Callable) -> BindResult<()> {
    let name = node.name_or("<anonymous>").to_string();
    let violation = if node.linkage != Linkage::External {
        Violation::NotExternal { name }
    } else if callable.is_variadic {
        Violation::Variadic { name }
    } else if callable.has_va_list_param() {
        Violation::VaListParameter { name }
    } else {
        return Ok(());
    };
    Err(BindError::new(node.location.clone(), violation))
}
