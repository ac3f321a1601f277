use std::collections::{BTreeMap, HashMap};

use super::resolver::Resolver;
use super::sense::{ArcFlags, Op, operation_flag};
use crate::error::{Error, Result};

/// Pre and post adjacency of one package in the ordering graph. `pre`
/// holds the packages this one requires, `post` the packages requiring
/// it. Keyed by package id so arc removal never touches package data.
#[derive(Debug, Default, Clone)]
struct Relation {
    pre: BTreeMap<usize, ArcFlags>,
    post: BTreeMap<usize, ArcFlags>,
}

/// The dependency graph of one transaction direction, with deterministic
/// node iteration in insertion order.
#[derive(Debug, Default)]
pub struct Relations {
    order: Vec<usize>,
    nodes: HashMap<usize, Relation>,
    /// node => pre arcs removed from it while breaking loops
    dropped: HashMap<usize, Vec<usize>>,
}

impl Relations {
    pub fn new<I: IntoIterator<Item = usize>>(ids: I) -> Self {
        let mut relations = Relations::default();
        for id in ids {
            relations.order.push(id);
            relations.nodes.insert(id, Relation::default());
        }
        relations
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Add the arc "`pkg` requires `pre`". Hard arcs are never
    /// overwritten by soft ones.
    pub fn add_arc(&mut self, pkg: usize, pre: usize, flags: ArcFlags) {
        let rel = self.nodes.get_mut(&pkg).expect("node in graph");
        if !flags.contains(ArcFlags::HARD) && rel.pre.contains_key(&pre) {
            return;
        }
        rel.pre.insert(pre, flags);
        self.nodes
            .get_mut(&pre)
            .expect("node in graph")
            .post
            .insert(pkg, ArcFlags::empty());
    }

    fn remove_node(&mut self, pkg: usize) {
        let rel = self.nodes.remove(&pkg).expect("node in graph");
        for r in rel.pre.keys() {
            self.nodes.get_mut(r).expect("neighbor").post.remove(&pkg);
        }
        for r in rel.post.keys() {
            self.nodes.get_mut(r).expect("neighbor").pre.remove(&pkg);
        }
        self.order.retain(|o| *o != pkg);
    }

    /// Repeatedly peel nodes nothing depends on, prepending them to
    /// `last`. Stops when a full pass removes nothing, which means the
    /// rest of the graph is cyclic or empty.
    fn separate_post_leaves(&mut self, last: &mut Vec<usize>) {
        while !self.is_empty() {
            let mut found = false;
            let mut i = 0;
            while i < self.order.len() {
                let pkg = self.order[i];
                if self.nodes[&pkg].post.is_empty() {
                    last.insert(0, pkg);
                    self.remove_node(pkg);
                    found = true;
                } else {
                    i += 1;
                }
            }
            if !found {
                break;
            }
        }
    }

    /// The node with no predecessors on which the most other nodes
    /// depend; ties go to the earliest inserted.
    fn next_leaf(&mut self) -> Option<usize> {
        let mut next = None;
        let mut next_post_len = 0;
        for pkg in &self.order {
            let rel = &self.nodes[pkg];
            if rel.pre.is_empty() && (next.is_none() || rel.post.len() > next_post_len) {
                next = Some(*pkg);
                next_post_len = rel.post.len();
            }
        }
        if let Some(pkg) = next {
            self.remove_node(pkg);
        }
        next
    }

    fn detect_loops_from(
        &self,
        path: &mut Vec<usize>,
        pkg: usize,
        loops: &mut Vec<Vec<usize>>,
        used: &mut HashMap<usize, bool>,
    ) {
        used.insert(pkg, true);
        for p in self.nodes[&pkg].pre.keys() {
            if let Some(pos) = path.iter().position(|x| x == p) {
                let mut cycle = path[pos..].to_vec();
                cycle.push(pkg);
                cycle.push(*p);
                loops.push(cycle);
            } else if !used.contains_key(p) {
                path.push(pkg);
                self.detect_loops_from(path, *p, loops, used);
                path.pop();
            }
        }
    }

    /// All dependency cycles, each in reverse dependency order with the
    /// first and last element identical.
    pub fn detect_loops(&self) -> Vec<Vec<usize>> {
        let mut loops = Vec::new();
        let mut used = HashMap::new();
        for pkg in &self.order {
            if !used.contains_key(pkg) {
                let mut path = Vec::new();
                self.detect_loops_from(&mut path, *pkg, &mut loops, &mut used);
            }
        }
        loops
    }

    /// Number of cycles each arc participates in.
    pub fn gen_counter(loops: &[Vec<usize>]) -> HashMap<(usize, usize), u32> {
        let mut counter = HashMap::new();
        for cycle in loops {
            for j in 0..cycle.len() - 1 {
                *counter.entry((cycle[j], cycle[j + 1])).or_insert(0) += 1;
            }
        }
        counter
    }

    /// Order cycles by decreasing preference to break them: fewest
    /// dependencies on other loops first, most packages required by
    /// other nodes next.
    pub fn sort_loops(&self, loops: &[Vec<usize>]) -> Vec<Vec<usize>> {
        let mut loop_nodes: Vec<usize> = Vec::new();
        for cycle in loops {
            for pkg in &cycle[..cycle.len() - 1] {
                if !loop_nodes.contains(pkg) {
                    loop_nodes.push(*pkg);
                }
            }
        }
        let mut keyed: Vec<(u32, u32, &Vec<usize>)> = Vec::new();
        for cycle in loops {
            let members = &cycle[..cycle.len() - 1];
            let mut relations = 0;
            let mut requires = 0;
            for pkg in members {
                for p in self.nodes[pkg].pre.keys() {
                    if loop_nodes.contains(p) && !members.contains(p) {
                        relations += 1;
                    }
                }
                for p in self.nodes[pkg].post.keys() {
                    if !members.contains(p) {
                        requires += 1;
                    }
                }
            }
            keyed.push((relations, requires, cycle));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        keyed.into_iter().map(|(_, _, c)| c.clone()).collect()
    }

    /// Drop the pre arc `node -> next`, adding virtual arcs so every
    /// package that depended on `node` still orders after `next`.
    fn drop_arc(&mut self, node: usize, next: usize) {
        let hard = self.nodes[&node].pre[&next].contains(ArcFlags::HARD);
        self.nodes.get_mut(&node).unwrap().pre.remove(&next);
        self.nodes.get_mut(&next).unwrap().post.remove(&node);
        self.dropped.entry(node).or_default().push(next);

        let dependents: Vec<usize> = self.nodes[&node].post.keys().copied().collect();
        for p in dependents {
            if p == next || p == node {
                continue;
            }
            if self
                .dropped
                .get(&p)
                .is_some_and(|d| d.contains(&next))
            {
                continue;
            }
            if !self.nodes[&p].pre.contains_key(&next) {
                let mut flags = ArcFlags::VIRTUAL;
                if hard && self.nodes[&p].pre[&node].contains(ArcFlags::HARD) {
                    flags |= ArcFlags::HARD;
                }
                self.nodes.get_mut(&p).unwrap().pre.insert(next, flags);
            }
            if !self.nodes[&next].post.contains_key(&p) {
                self.nodes
                    .get_mut(&next)
                    .unwrap()
                    .post
                    .insert(p, ArcFlags::VIRTUAL);
            }
        }
    }

    fn try_break(
        &mut self,
        counter: &HashMap<(usize, usize), u32>,
        cycle: &[usize],
        hard: bool,
    ) -> bool {
        let mut virt_best: Option<(usize, usize)> = None;
        let mut virt_count = 0;
        let mut best: Option<(usize, usize)> = None;
        let mut count = 0;
        for j in 0..cycle.len() - 1 {
            let node = cycle[j];
            let next = cycle[j + 1];
            let flags = self.nodes[&node].pre[&next];
            if !hard && flags.contains(ArcFlags::HARD) {
                continue;
            }
            let c = counter.get(&(node, next)).copied().unwrap_or(0);
            if flags.contains(ArcFlags::VIRTUAL) {
                if virt_count < c {
                    virt_best = Some((node, next));
                    virt_count = c;
                }
            } else if count < c {
                best = Some((node, next));
                count = c;
            }
        }
        // prefer to drop a synthetic arc over a real one
        if let Some((node, next)) = virt_best {
            self.drop_arc(node, next);
            return true;
        }
        if let Some((node, next)) = best {
            self.drop_arc(node, next);
            return true;
        }
        false
    }

    /// Break one arc of `cycle`, soft arcs first, hard arcs only when no
    /// soft arc exists.
    pub fn breakup_loop(&mut self, loops: &[Vec<usize>], cycle: &[usize]) -> bool {
        let counter = Self::gen_counter(loops);
        if self.try_break(&counter, cycle, false) {
            return true;
        }
        self.try_break(&counter, cycle, true)
    }

    /// Consume the graph into an installation order. Returns None when a
    /// cycle survives even hard-arc removal.
    pub fn gen_order(mut self) -> Option<Vec<usize>> {
        let mut order = Vec::new();
        let mut last = Vec::new();
        while !self.is_empty() {
            self.separate_post_leaves(&mut last);
            if self.is_empty() {
                break;
            }
            if let Some(next) = self.next_leaf() {
                order.push(next);
            } else {
                let loops = self.detect_loops();
                if loops.is_empty() {
                    return None;
                }
                let sorted = self.sort_loops(&loops);
                if !self.breakup_loop(&loops, &sorted[0]) {
                    return None;
                }
            }
        }
        order.extend(last);
        Some(order)
    }
}

/// Plans the operation sequence of one transaction: ordered installs and
/// updates with their displaced erases, then explicit erases in reverse
/// dependency order.
pub struct Orderer<'a> {
    resolver: &'a Resolver,
    installs: Vec<usize>,
    updates: HashMap<usize, Vec<usize>>,
    obsoletes: HashMap<usize, Vec<usize>>,
    erases: Vec<usize>,
}

impl<'a> Orderer<'a> {
    /// `updates` and `obsoletes` map each incoming package to the
    /// installed packages it displaces; those are erased as part of the
    /// update and removed from the explicit erase list.
    pub fn new(
        resolver: &'a Resolver,
        installs: Vec<usize>,
        updates: HashMap<usize, Vec<usize>>,
        obsoletes: HashMap<usize, Vec<usize>>,
        mut erases: Vec<usize>,
    ) -> Self {
        for displaced in updates.values().chain(obsoletes.values()) {
            erases.retain(|e| !displaced.contains(e));
        }
        Orderer {
            resolver,
            installs,
            updates,
            obsoletes,
            erases,
        }
    }

    /// Build the pre/post graph for `members` under `op`: every resolved
    /// requirement between two members becomes an arc with the hardness
    /// given by the operation-flag rule.
    pub fn gen_relations(&self, members: &[usize], op: Op) -> Relations {
        let mut relations = Relations::new(members.iter().copied());
        let mut keys: Vec<_> = self.resolver.requires.keys().cloned().collect();
        keys.sort_by(|a, b| {
            (a.0.as_str(), a.1.bits(), a.2.as_str()).cmp(&(b.0.as_str(), b.1.bits(), b.2.as_str()))
        });
        for (name, flags, version) in keys {
            if name.starts_with("rpmlib(") || name.starts_with("config(") {
                continue;
            }
            let requirers = &self.resolver.requires[&(name.clone(), flags, version.clone())];
            let resolved: Vec<usize> = self
                .resolver
                .search_provides(&name, flags, &version)
                .into_iter()
                .filter(|id| relations.contains(*id))
                .collect();
            if resolved.is_empty() {
                continue;
            }
            let hardness = operation_flag(flags, op);
            for pkg in requirers {
                if !relations.contains(*pkg) || resolved.contains(pkg) {
                    continue;
                }
                for pre in &resolved {
                    relations.add_arc(*pkg, *pre, hardness);
                }
            }
        }
        relations
    }

    fn gen_erase_ops(&self, list: &[usize]) -> Result<Vec<(Op, usize)>> {
        if list.len() == 1 {
            return Ok(vec![(Op::Erase, list[0])]);
        }
        Orderer::new(
            self.resolver,
            Vec::new(),
            HashMap::new(),
            HashMap::new(),
            list.to_vec(),
        )
        .order()
    }

    fn gen_operations(&self, order: &[usize]) -> Result<Vec<(Op, usize)>> {
        let mut operations = Vec::new();
        for r in order {
            if self.erases.contains(r) {
                operations.push((Op::Erase, *r));
                continue;
            }
            let op = if self.updates.contains_key(r) {
                Op::Update
            } else {
                Op::Install
            };
            operations.push((op, *r));
            if let Some(displaced) = self.obsoletes.get(r) {
                operations.extend(self.gen_erase_ops(displaced)?);
            }
            if let Some(displaced) = self.updates.get(r) {
                operations.extend(self.gen_erase_ops(displaced)?);
            }
        }
        Ok(operations)
    }

    pub fn order(&self) -> Result<Vec<(Op, usize)>> {
        let mut order = Vec::new();
        if !self.installs.is_empty() {
            let relations = self.gen_relations(&self.installs, Op::Install);
            let installed = relations
                .gen_order()
                .ok_or_else(|| Error::Ordering("unbreakable dependency cycle".to_string()))?;
            order.extend(installed);
        }
        if !self.erases.is_empty() {
            let relations = self.gen_relations(&self.erases, Op::Erase);
            let mut erased = relations
                .gen_order()
                .ok_or_else(|| Error::Ordering("unbreakable dependency cycle".to_string()))?;
            erased.reverse();
            order.extend(erased);
        }
        self.gen_operations(&order)
    }
}
