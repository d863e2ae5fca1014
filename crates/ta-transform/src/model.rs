//! NTA Model API (`spec.md` §3, §4.3).
//!
//! A [`System`] owns an ordered mapping of [`Template`]s, global
//! declarations, a [`SystemDeclaration`], and queries. A `Template` owns
//! ordered mappings of [`Location`]s and [`Edge`]s, its own declaration, and
//! parameters. Ids are `u64`s minted by the owning collection so that a
//! fresh copy (`assign_from`) can either keep or regenerate them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ta_core::Ast;

use crate::Query;

pub type Id = u64;

/// A channel synchronization label on an edge (`c!`/`c?`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncKind {
    Send,
    Receive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sync {
    pub channel: String,
    pub kind: SyncKind,
}

/// A named select (`select k : int[0,n]`), binding `name` over the clause
/// range `range`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub name: String,
    pub range: Ast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: Id,
    pub name: String,
    pub urgent: bool,
    pub committed: bool,
    pub invariants: Vec<Ast>,
    pub in_edges: Vec<Id>,
    pub out_edges: Vec<Id>,
}

impl Location {
    fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            urgent: false,
            committed: false,
            invariants: Vec::new(),
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Id,
    pub source: Id,
    pub target: Id,
    pub selects: Vec<Select>,
    pub clock_guards: Vec<Ast>,
    pub variable_guards: Vec<Ast>,
    pub sync: Option<Sync>,
    pub updates: Vec<Ast>,
    pub resets: Vec<String>,
}

impl Edge {
    fn new(id: Id, source: Id, target: Id) -> Self {
        Self {
            id,
            source,
            target,
            selects: Vec::new(),
            clock_guards: Vec::new(),
            variable_guards: Vec::new(),
            sync: None,
            updates: Vec::new(),
            resets: Vec::new(),
        }
    }

    /// `source(e) -> source(e) == target(e)`? Self-loops never contribute to
    /// location-tracking updates (`spec.md` §3, §4.5).
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}

/// One template's formal parameter (`spec.md` §3 `Parameter`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub is_ref: bool,
    pub ty: Ast,
    pub name: String,
    pub array_decl: Vec<Ast>,
}

/// A template's local declaration block: a flat list of declaration/
/// statement nodes (`VariableDecls`, `Function`, ...), mirroring
/// `StatementBlock::decls` without the enclosing statement list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub items: Vec<Ast>,
}

impl Declaration {
    pub fn push(&mut self, item: Ast) {
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Id,
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub declaration: Declaration,
    pub locations: IndexMap<Id, Location>,
    pub edges: IndexMap<Id, Edge>,
    pub initial_location: Option<Id>,
    next_id: Id,
}

impl Template {
    fn new(id: Id, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parameters: Vec::new(),
            declaration: Declaration::default(),
            locations: IndexMap::new(),
            edges: IndexMap::new(),
            initial_location: None,
            next_id: 0,
        }
    }

    fn fresh_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    /// Add a new, uniquely-identified location; the first location added
    /// to a template becomes `initial_location` unless one is already set.
    pub fn new_location(&mut self, name: impl Into<String>) -> Id {
        let id = self.fresh_id();
        self.locations.insert(id, Location::new(id, name));
        if self.initial_location.is_none() {
            self.initial_location = Some(id);
        }
        id
    }

    pub fn get_location_by_name(&self, name: &str) -> Option<&Location> {
        self.locations.values().find(|l| l.name == name)
    }

    pub fn get_location_by_id(&self, id: Id) -> Option<&Location> {
        self.locations.get(&id)
    }

    /// Add a new edge between two existing locations, wiring the
    /// `in_edges`/`out_edges` adjacency sets.
    pub fn new_edge(&mut self, source: Id, target: Id) -> Id {
        let id = self.fresh_id();
        self.edges.insert(id, Edge::new(id, source, target));
        if let Some(loc) = self.locations.get_mut(&source) {
            loc.out_edges.push(id);
        }
        if let Some(loc) = self.locations.get_mut(&target) {
            loc.in_edges.push(id);
        }
        id
    }

    pub fn get_edge(&self, id: Id) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn get_edge_mut(&mut self, id: Id) -> Option<&mut Edge> {
        self.edges.get_mut(&id)
    }

    /// Named, non-anonymous locations in insertion order — the ones the
    /// matcher builder's location-tracking needs a numeric id for.
    pub fn named_locations(&self) -> impl Iterator<Item = &Location> {
        self.locations.values().filter(|l| !l.name.is_empty())
    }

    /// Deep-copy this template under a new id, optionally regenerating all
    /// location/edge ids (`spec.md` §4.3 `assign_from`, `§9` "deep copy of
    /// nested graphs... never alias references across a copy boundary").
    pub fn deep_copy(&self, new_id: Id, assign_ids: bool) -> Template {
        if !assign_ids {
            let mut copy = self.clone();
            copy.id = new_id;
            return copy;
        }
        let mut copy = Template::new(new_id, self.name.clone());
        copy.parameters = self.parameters.clone();
        copy.declaration = self.declaration.clone();
        let mut loc_map = IndexMap::new();
        for loc in self.locations.values() {
            let new_loc_id = copy.new_location(loc.name.clone());
            let l = copy.locations.get_mut(&new_loc_id).unwrap();
            l.urgent = loc.urgent;
            l.committed = loc.committed;
            l.invariants = loc.invariants.clone();
            loc_map.insert(loc.id, new_loc_id);
        }
        if let Some(init) = self.initial_location {
            copy.initial_location = loc_map.get(&init).copied();
        }
        for edge in self.edges.values() {
            let src = loc_map[&edge.source];
            let tgt = loc_map[&edge.target];
            let new_edge_id = copy.new_edge(src, tgt);
            let e = copy.edges.get_mut(&new_edge_id).unwrap();
            e.selects = edge.selects.clone();
            e.clock_guards = edge.clock_guards.clone();
            e.variable_guards = edge.variable_guards.clone();
            e.sync = edge.sync.clone();
            e.updates = edge.updates.clone();
            e.resets = edge.resets.clone();
        }
        copy
    }
}

/// One `Instantiation = template(args)` declaration in the system section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instantiation {
    pub instance_name: String,
    pub template_id: Id,
    pub args: Vec<Ast>,
}

/// The `system ...;` process list plus its instantiations (grounded in
/// `uppaal_model/backend/models/nta/system_declaration.py`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemDeclaration {
    pub instantiations: Vec<Instantiation>,
    /// Outer list is priority groups, as `Ast::System::process_names`.
    pub process_names: Vec<Vec<String>>,
    /// Variable/type/function declarations interspersed in the system
    /// section itself (alongside `Instantiation`s), lifted to
    /// `System::global_declaration` by preprocessing step 1.
    pub local_items: Vec<Ast>,
}

impl SystemDeclaration {
    pub fn add_instantiation(&mut self, instance_name: impl Into<String>, template_id: Id, args: Vec<Ast>) {
        let instance_name = instance_name.into();
        self.process_names.push(vec![instance_name.clone()]);
        self.instantiations.push(Instantiation { instance_name, template_id, args });
    }

    pub fn instance_order(&self) -> impl Iterator<Item = &str> {
        self.process_names.iter().flatten().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub templates: IndexMap<Id, Template>,
    pub global_declaration: Declaration,
    pub system_declaration: SystemDeclaration,
    pub queries: Vec<Query>,
    next_id: Id,
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl System {
    pub fn new() -> Self {
        Self {
            templates: IndexMap::new(),
            global_declaration: Declaration::default(),
            system_declaration: SystemDeclaration::default(),
            queries: Vec::new(),
            next_id: 0,
        }
    }

    fn fresh_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_template(&mut self, template: Template) -> Id {
        let id = template.id;
        self.templates.insert(id, template);
        id
    }

    pub fn new_template(&mut self, name: impl Into<String>) -> Id {
        let id = self.fresh_id();
        self.templates.insert(id, Template::new(id, name));
        id
    }

    pub fn get_template_by_id(&self, id: Id) -> Option<&Template> {
        self.templates.get(&id)
    }

    pub fn get_template_by_id_mut(&mut self, id: Id) -> Option<&mut Template> {
        self.templates.get_mut(&id)
    }

    pub fn get_template_by_name(&self, name: &str) -> Option<&Template> {
        self.templates.values().find(|t| t.name == name)
    }

    pub fn get_template_by_index(&self, index: usize) -> Option<&Template> {
        self.templates.get_index(index).map(|(_, t)| t)
    }

    /// Deep-copy the entire system (`spec.md` §4.3): the input model is
    /// never mutated by a transformation, only its copy.
    pub fn assign_from(other: &System, assign_ids: bool) -> System {
        let mut copy = System::new();
        copy.global_declaration = other.global_declaration.clone();
        copy.system_declaration = other.system_declaration.clone();
        copy.queries = other.queries.clone();
        if !assign_ids {
            copy.templates = other.templates.clone();
            copy.next_id = other.next_id;
            return copy;
        }
        let mut id_map = IndexMap::new();
        for template in other.templates.values() {
            let new_id = copy.fresh_id();
            id_map.insert(template.id, new_id);
            let new_template = template.deep_copy(new_id, true);
            copy.templates.insert(new_id, new_template);
        }
        for inst in copy.system_declaration.instantiations.iter_mut() {
            if let Some(&new_id) = id_map.get(&inst.template_id) {
                inst.template_id = new_id;
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_template_first_location_is_initial() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        let t = sys.get_template_by_id_mut(tid).unwrap();
        let l0 = t.new_location("l0");
        let l1 = t.new_location("l1");
        assert_eq!(t.initial_location, Some(l0));
        assert_ne!(l0, l1);
    }

    #[test]
    fn new_edge_wires_adjacency() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        let t = sys.get_template_by_id_mut(tid).unwrap();
        let l0 = t.new_location("l0");
        let l1 = t.new_location("l1");
        let e = t.new_edge(l0, l1);
        assert_eq!(t.locations[&l0].out_edges, vec![e]);
        assert_eq!(t.locations[&l1].in_edges, vec![e]);
    }

    #[test]
    fn assign_from_with_ids_produces_independent_copy() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        let t = sys.get_template_by_id_mut(tid).unwrap();
        let l0 = t.new_location("l0");
        let l1 = t.new_location("l1");
        t.new_edge(l0, l1);
        sys.system_declaration.add_instantiation("p", tid, vec![]);

        let copy = System::assign_from(&sys, true);
        assert_eq!(copy.templates.len(), 1);
        let copied_tid = *copy.templates.keys().next().unwrap();
        assert_ne!(copied_tid, tid, "deep copy must regenerate template ids");
        let copied = copy.get_template_by_id(copied_tid).unwrap();
        assert_eq!(copied.locations.len(), 2);
        assert_eq!(copied.edges.len(), 1);
        assert_eq!(copy.system_declaration.instantiations[0].template_id, copied_tid);
    }

    #[test]
    fn assign_from_without_ids_preserves_ids() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        let copy = System::assign_from(&sys, false);
        assert!(copy.get_template_by_id(tid).is_some());
    }
}
