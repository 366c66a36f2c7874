//! Elaboration: flattening parsed modules into netlists of NAND and DFF nodes.
//!
//! Every call to a user module is inlined by re-elaborating the callee's body
//! with its inputs bound to the argument wires, so each instantiation gets fresh nodes.
//! Node ids come from an [`ElabContext`] and are unique and increasing within it.
//!
//! Width rules:
//! * Number literals, black boxes and forward references have no width of their own.
//!   They take the width their use requires, or their natural width otherwise.
//! * Both operands of `nand` must have the same width.
//! * The clock of `dff` is either 1 bit (shared by every data bit) or as wide as the data.
//! * Wires bound to module inputs or outputs are truncated or zero-extended to the port width.
//!
//! Anything which is not a structural error degrades to constant 0 with a warning:
//! calls to undefined modules, undefined names, unknown fields and out of range bits.
use super::*;
use crate::ast;
use crate::context::Context;

use std::collections::{BTreeMap, BTreeSet};

use log::*;
use serde::Serialize;

pub type NodeId = usize;

/// A single bit source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Bit {
    /// The output of a node.
    Node(NodeId),
    /// A bit of the module's inputs, all input ports laid out one after another (bit 0 first).
    Input(usize),
    Const(bool),
    /// A read of a name before the statement which assigns it.
    /// These are replaced by the name's final binding before elaboration of the body finishes.
    #[serde(skip)]
    Forward(usize),
}

/// An ordered sequence of bits, least significant first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Wire(pub Vec<Bit>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Nand { a: Bit, b: Bit },
    /// Captures `d` when `clk` goes from 0 to 1.
    Dff { d: Bit, clk: Bit },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
}

/// The flattened netlist of one module.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledModule {
    pub name: Name,
    pub inputs: Vec<ast::Port>,
    pub outputs: Vec<(ast::Port, Wire)>,
    pub nodes: Vec<Node>,
    /// Every named signal of the module body: inputs, locals, outputs.
    /// Fields of a multi-output instance `x` are named `x.field`.
    pub signals: BTreeMap<Name, Wire>,
}

/// The result of compiling a set of modules.
#[derive(Debug, Clone, Serialize)]
pub struct Compilation {
    modules: BTreeMap<Name, CompiledModule>,
    order: Vec<Name>,
}

/// Owns the node id counter.
/// Each context is an independent compilation universe:
/// compiling the same source in two fresh contexts yields identical netlists.
#[derive(Debug, Default)]
pub struct ElabContext {
    next_id: NodeId,
}

/// Compiles `modules` in a fresh [`ElabContext`].
pub fn compile(modules: &[ast::Module]) -> Result<Compilation, CompileError> {
    ElabContext::new().compile(modules)
}

impl Wire {
    pub fn zeros(width: usize) -> Wire {
        Wire(vec![Bit::Const(false); width])
    }

    pub fn constant(value: u64, width: usize) -> Wire {
        Wire((0..width).map(|i| Bit::Const(bit_of(value, i))).collect())
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn bits(&self) -> &[Bit] {
        &self.0
    }

    pub fn bit(&self, i: usize) -> Option<Bit> {
        self.0.get(i).copied()
    }

    /// Truncates or zero-extends to `width`.
    pub fn fit(mut self, width: usize) -> Wire {
        self.0.resize(width, Bit::Const(false));
        self
    }

    fn map_bits(self, f: impl Fn(Bit) -> Bit) -> Wire {
        Wire(self.0.into_iter().map(f).collect())
    }
}

impl NodeKind {
    pub fn inputs(&self) -> [Bit; 2] {
        match *self {
            NodeKind::Nand { a, b } => [a, b],
            NodeKind::Dff { d, clk } => [d, clk],
        }
    }

    fn map_bits(self, f: impl Fn(Bit) -> Bit) -> NodeKind {
        match self {
            NodeKind::Nand { a, b } => NodeKind::Nand { a: f(a), b: f(b) },
            NodeKind::Dff { d, clk } => NodeKind::Dff { d: f(d), clk: f(clk) },
        }
    }
}

impl CompiledModule {
    pub fn output(&self, name: &str) -> Option<&Wire> {
        self.outputs.iter().find(|(port, _wire)| port.name == name).map(|(_port, wire)| wire)
    }

    pub fn signal(&self, name: &str) -> Option<&Wire> {
        self.signals.get(name)
    }

    pub fn input_width(&self) -> usize {
        self.inputs.iter().map(|port| port.width).sum()
    }

    pub fn dff_count(&self) -> usize {
        self.nodes.iter().filter(|node| matches!(node.kind, NodeKind::Dff { .. })).count()
    }
}

impl Compilation {
    pub fn get(&self, name: &str) -> Option<&CompiledModule> {
        self.modules.get(name)
    }

    /// The last module defined in the source.
    pub fn main(&self) -> Option<&CompiledModule> {
        self.order.last().and_then(|name| self.modules.get(name))
    }
}

impl ElabContext {
    pub fn new() -> ElabContext {
        ElabContext { next_id: 0 }
    }

    /// Starts numbering nodes from 0 again.
    pub fn reset(&mut self) {
        self.next_id = 0;
    }

    /// Compiles every module. Node ids continue from where the previous compile in this context left off.
    pub fn compile(&mut self, modules: &[ast::Module]) -> Result<Compilation, CompileError> {
        if modules.is_empty() {
            return Err(CompileError::NoModules);
        }

        let mut defs: BTreeMap<&str, (usize, &ast::Module)> = BTreeMap::new();
        for (index, module) in modules.iter().enumerate() {
            if defs.insert(module.name.as_str(), (index, module)).is_some() {
                return Err(CompileError::DuplicateModule(module.name.clone()));
            }
            let mut port_names = BTreeSet::new();
            for port in module.inputs.iter().chain(module.outputs.iter()) {
                if !port_names.insert(port.name.as_str()) {
                    return Err(CompileError::DuplicatePort(module.name.clone(), port.name.clone()));
                }
            }
            check_indices(module)?;
        }

        let mut compiled = BTreeMap::new();
        let mut order = vec![];
        for (index, module) in modules.iter().enumerate() {
            let first_id = self.next_id;
            let mut elab = Elaborator {
                next_id: self.next_id,
                defs: &defs,
                nodes: vec![],
                forwards: vec![],
                stack: vec![],
            };

            let mut offset = 0;
            let mut signals = BTreeMap::new();
            let mut args = vec![];
            for port in &module.inputs {
                let wire = Wire((offset..offset + port.width).map(Bit::Input).collect());
                offset += port.width;
                signals.insert(port.name.clone(), wire.clone());
                args.push(wire);
            }

            let instance = elab.instantiate(module, index, args)?;
            self.next_id = elab.next_id;

            signals.extend(instance.locals);
            let mut outputs = vec![];
            for (port, (_name, wire)) in module.outputs.iter().zip(instance.outputs) {
                signals.insert(port.name.clone(), wire.clone());
                outputs.push((port.clone(), wire));
            }

            info!("Compiled {}: {} nodes (ids {}..{})", module.name, elab.nodes.len(), first_id, self.next_id);
            compiled.insert(module.name.clone(), CompiledModule {
                name: module.name.clone(),
                inputs: module.inputs.clone(),
                outputs,
                nodes: elab.nodes,
                signals,
            });
            order.push(module.name.clone());
        }

        Ok(Compilation {
            modules: compiled,
            order,
        })
    }
}

/// The value of an expression during elaboration.
#[derive(Debug, Clone)]
enum Signal {
    Wire(Wire),
    /// The outputs of a module instance.
    Bundle(Vec<(Name, Wire)>),
    Literal(u64),
    /// The outputs of a call to an undefined module. Always 0.
    BlackBox,
    /// A name which is assigned later in the body.
    Forward(Name),
}

#[derive(Debug, Clone)]
struct ForwardSlot {
    name: Name,
    bit: usize,
}

struct Instance {
    outputs: Vec<(Name, Wire)>,
    locals: Vec<(Name, Wire)>,
}

struct Elaborator<'m> {
    next_id: NodeId,
    /// Every module with its position in the source.
    defs: &'m BTreeMap<&'m str, (usize, &'m ast::Module)>,
    nodes: Vec<Node>,
    forwards: Vec<ForwardSlot>,
    stack: Vec<Name>,
}

/// The module body being elaborated.
struct Body<'m> {
    def: &'m ast::Module,
    // position of `def` in the source; only modules up to here can be called
    index: usize,
    scope: Context<Signal>,
    targets: BTreeSet<&'m str>,
}

impl<'m> Elaborator<'m> {
    fn alloc(&mut self, kind: NodeKind) -> Bit {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push(Node { id, kind });
        Bit::Node(id)
    }

    fn instantiate(&mut self, def: &'m ast::Module, index: usize, args: Vec<Wire>) -> Result<Instance, CompileError> {
        if self.stack.contains(&def.name) {
            let mut stack = self.stack.clone();
            stack.push(def.name.clone());
            return Err(CompileError::RecursiveInstantiation(stack));
        }
        self.stack.push(def.name.clone());
        debug!("{}instantiate {}", "  ".repeat(self.stack.len() - 1), def.name);

        let node_base = self.nodes.len();
        let forward_base = self.forwards.len();

        let mut body = Body {
            def,
            index,
            scope: Context::empty(),
            targets: def.targets().into_iter().collect(),
        };
        for (port, arg) in def.inputs.iter().zip(args) {
            body.scope.bind(port.name.clone(), Signal::Wire(arg.fit(port.width)));
        }

        for stmt in &def.statements {
            self.statement(&mut body, stmt)?;
        }

        let mut outputs = vec![];
        for port in &def.outputs {
            let wire = match body.scope.lookup(&port.name) {
                Some(signal) => self.materialize(&body, signal, Some(port.width)).fit(port.width),
                None => {
                    warn!("Output {} of {} is never assigned", port.name, def.name);
                    Wire::zeros(port.width)
                },
            };
            outputs.push((port.name.clone(), wire));
        }

        let mut locals = vec![];
        if self.stack.len() == 1 {
            for (name, signal) in body.scope.latest() {
                match follow(&body.scope, signal) {
                    Signal::Bundle(fields) if fields.len() != 1 => {
                        for (field, wire) in fields {
                            locals.push((format!("{name}.{field}"), wire));
                        }
                    },
                    signal => {
                        let wire = self.materialize(&body, signal, None);
                        locals.push((name, wire));
                    },
                }
            }
        }

        let resolved = self.resolve_forwards(&body, forward_base);
        let subst = |bit: Bit| match bit {
            Bit::Forward(slot) if slot >= forward_base => resolved[slot - forward_base],
            bit => bit,
        };
        for node in &mut self.nodes[node_base..] {
            node.kind = node.kind.map_bits(subst);
        }
        let outputs = outputs.into_iter().map(|(name, wire)| (name, wire.map_bits(subst))).collect();
        let locals = locals.into_iter().map(|(name, wire)| (name, wire.map_bits(subst))).collect();
        self.forwards.truncate(forward_base);

        self.stack.pop();
        Ok(Instance { outputs, locals })
    }

    /// Maps every forward slot created since `base` to the bit of the name's final binding.
    fn resolve_forwards(&self, body: &Body, base: usize) -> Vec<Bit> {
        let direct: Vec<Bit> = self.forwards[base..]
            .iter()
            .map(|slot| final_bit(&body.scope, slot))
            .collect();

        let mut resolved = Vec::with_capacity(direct.len());
        for (i, slot) in self.forwards[base..].iter().enumerate() {
            let mut bit = direct[i];
            let mut hops = 0;
            while let Bit::Forward(next) = bit {
                if next < base {
                    break;
                }
                if hops > direct.len() {
                    warn!("{} in {} is defined only in terms of itself; using 0", slot.name, body.def.name);
                    bit = Bit::Const(false);
                    break;
                }
                bit = direct[next - base];
                hops += 1;
            }
            resolved.push(bit);
        }
        resolved
    }

    fn statement(&mut self, body: &mut Body<'m>, stmt: &'m ast::Statement) -> Result<(), CompileError> {
        let name = &stmt.target.name;
        let declared = body.def.output(name).map(|port| port.width);

        match &stmt.target.range {
            None => {
                let signal = self.expr(body, &stmt.expr, declared)?;
                body.scope.bind(name.clone(), signal);
            },
            Some(range) => {
                let (lo, hi) = range.bounds();
                let width = range.width();
                let signal = self.expr(body, &stmt.expr, Some(width))?;
                let value = self.materialize(body, signal, Some(width)).fit(width);

                let current_width = declared.unwrap_or(hi + 1).max(hi + 1);
                let mut current = match body.scope.lookup(name) {
                    Some(signal) => self.materialize(body, signal, declared.or(Some(hi + 1))),
                    None => Wire::zeros(current_width),
                };
                if current.width() < hi + 1 {
                    current = current.fit(hi + 1);
                }
                current.0[lo..=hi].copy_from_slice(&value.0);
                body.scope.bind(name.clone(), Signal::Wire(current));
            },
        }
        Ok(())
    }

    fn expr(&mut self, body: &Body<'m>, expr: &'m ast::Expr, hint: Option<usize>) -> Result<Signal, CompileError> {
        Ok(match expr {
            ast::Expr::Identifier { name } => match body.scope.lookup(name) {
                Some(signal) => signal,
                None if body.targets.contains(name.as_str()) => Signal::Forward(name.clone()),
                None => {
                    warn!("Undefined name {name} in {}; using 0", body.def.name);
                    Signal::BlackBox
                },
            },
            ast::Expr::Number { value } => Signal::Literal(*value),
            ast::Expr::Call { name, args } => self.call(body, name, args, hint)?,
            ast::Expr::Member { object, field } => {
                match follow(&body.scope, self.expr(body, object, None)?) {
                    Signal::Bundle(fields) => {
                        if let Some((_field, wire)) = fields.into_iter().find(|(name, _wire)| name == field) {
                            Signal::Wire(wire)
                        } else {
                            warn!("No output named {field} in {object}; using 0");
                            Signal::BlackBox
                        }
                    },
                    Signal::BlackBox => Signal::BlackBox,
                    _ => {
                        warn!("{object} is not a module instance, so it has no field {field}; using 0");
                        Signal::BlackBox
                    },
                }
            },
            ast::Expr::Index { object, bit } => {
                let signal = self.expr(body, object, None)?;
                Signal::Wire(self.project(body, signal, *bit, *bit))
            },
            ast::Expr::Slice { object, lo, hi } => {
                let signal = self.expr(body, object, None)?;
                Signal::Wire(self.project(body, signal, *lo.min(hi), *lo.max(hi)))
            },
        })
    }

    fn call(&mut self, body: &Body<'m>, name: &str, args: &'m [ast::Expr], hint: Option<usize>) -> Result<Signal, CompileError> {
        match name {
            "nand" => {
                check_arity(name, 2, args.len())?;
                let a = self.expr(body, &args[0], hint)?;
                let b = self.expr(body, &args[1], hint)?;

                let width = match (known_width(&body.scope, &a), known_width(&body.scope, &b)) {
                    (Some(wa), Some(wb)) if wa != wb => return Err(CompileError::WidthMismatch("nand", wa, wb)),
                    (Some(w), _) | (None, Some(w)) => w,
                    (None, None) => hint.unwrap_or_else(|| natural_width(&a).max(natural_width(&b))),
                };
                let a = self.materialize(body, a, Some(width)).fit(width);
                let b = self.materialize(body, b, Some(width)).fit(width);

                let bits = a.0.into_iter().zip(b.0).map(|(a, b)| self.alloc(NodeKind::Nand { a, b })).collect();
                Ok(Signal::Wire(Wire(bits)))
            },
            "dff" => {
                check_arity(name, 2, args.len())?;
                let d = self.expr(body, &args[0], hint)?;
                let clk = self.expr(body, &args[1], Some(1))?;

                let width = known_width(&body.scope, &d).unwrap_or_else(|| hint.unwrap_or_else(|| natural_width(&d)));
                let d = self.materialize(body, d, Some(width)).fit(width);
                let clk = match known_width(&body.scope, &clk) {
                    Some(1) | None => {
                        let clk = self.materialize(body, clk, Some(1)).fit(1);
                        Wire(vec![clk.0[0]; width])
                    },
                    Some(w) if w == width => self.materialize(body, clk, Some(width)),
                    Some(w) => return Err(CompileError::WidthMismatch("dff", width, w)),
                };

                let bits = d.0.into_iter().zip(clk.0).map(|(d, clk)| self.alloc(NodeKind::Dff { d, clk })).collect();
                Ok(Signal::Wire(Wire(bits)))
            },
            _ => {
                let Some((index, def)) = self.defs.get(name).copied().filter(|(index, _def)| *index <= body.index) else {
                    warn!("Undefined module {name} called from {}; its outputs are 0", body.def.name);
                    return Ok(Signal::BlackBox);
                };
                check_arity(name, def.inputs.len(), args.len())?;

                let mut wires = vec![];
                for (port, arg) in def.inputs.iter().zip(args) {
                    let signal = self.expr(body, arg, Some(port.width))?;
                    wires.push(self.materialize(body, signal, Some(port.width)).fit(port.width));
                }
                let instance = self.instantiate(def, index, wires)?;
                Ok(Signal::Bundle(instance.outputs))
            },
        }
    }

    /// Turns a signal into a wire. `hint` is the width the use site needs, if it has one.
    fn materialize(&mut self, body: &Body, signal: Signal, hint: Option<usize>) -> Wire {
        match follow(&body.scope, signal) {
            Signal::Wire(wire) => wire,
            Signal::Bundle(mut fields) => {
                if fields.len() == 1 {
                    fields.remove(0).1
                } else {
                    warn!("An instance with {} outputs is used as a single wire in {}; using 0", fields.len(), body.def.name);
                    Wire::zeros(hint.unwrap_or(1))
                }
            },
            Signal::Literal(value) => Wire::constant(value, hint.unwrap_or_else(|| bit_length(value))),
            Signal::BlackBox => Wire::zeros(hint.unwrap_or(1)),
            Signal::Forward(name) => self.forward_bits(&name, 0, hint.unwrap_or(1) - 1),
        }
    }

    /// Bits `lo..=hi` of a signal.
    fn project(&mut self, body: &Body, signal: Signal, lo: usize, hi: usize) -> Wire {
        match follow(&body.scope, signal) {
            Signal::Literal(value) => Wire((lo..=hi).map(|i| Bit::Const(bit_of(value, i))).collect()),
            Signal::BlackBox => Wire::zeros(hi - lo + 1),
            Signal::Forward(name) => self.forward_bits(&name, lo, hi),
            signal => {
                let wire = self.materialize(body, signal, None);
                if hi >= wire.width() {
                    warn!("Bit {hi} is out of range for a {} bit wire in {}; missing bits are 0", wire.width(), body.def.name);
                }
                Wire((lo..=hi).map(|i| wire.bit(i).unwrap_or(Bit::Const(false))).collect())
            },
        }
    }

    fn forward_bits(&mut self, name: &str, lo: usize, hi: usize) -> Wire {
        let mut bits = vec![];
        for bit in lo..=hi {
            bits.push(Bit::Forward(self.forwards.len()));
            self.forwards.push(ForwardSlot { name: name.to_string(), bit });
        }
        Wire(bits)
    }
}

/// Replaces forward references to names which have been bound since.
fn follow(scope: &Context<Signal>, mut signal: Signal) -> Signal {
    let mut seen: Vec<Name> = vec![];
    while let Signal::Forward(name) = &signal {
        if seen.contains(name) {
            break;
        }
        match scope.lookup(name) {
            Some(next) => {
                seen.push(name.clone());
                signal = next;
            },
            None => break,
        }
    }
    signal
}

fn final_bit(scope: &Context<Signal>, slot: &ForwardSlot) -> Bit {
    match follow(scope, Signal::Forward(slot.name.clone())) {
        Signal::Wire(wire) => wire.bit(slot.bit).unwrap_or(Bit::Const(false)),
        Signal::Bundle(fields) if fields.len() == 1 => fields[0].1.bit(slot.bit).unwrap_or(Bit::Const(false)),
        Signal::Literal(value) => Bit::Const(bit_of(value, slot.bit)),
        _ => Bit::Const(false),
    }
}

fn known_width(scope: &Context<Signal>, signal: &Signal) -> Option<usize> {
    match follow(scope, signal.clone()) {
        Signal::Wire(wire) => Some(wire.width()),
        Signal::Bundle(fields) if fields.len() == 1 => Some(fields[0].1.width()),
        _ => None,
    }
}

fn natural_width(signal: &Signal) -> usize {
    match signal {
        Signal::Literal(value) => bit_length(*value),
        _ => 1,
    }
}

/// Rejects widths and bit indices no circuit needs, before anything is allocated for them.
/// The parser enforces the same bound; trees built by other tools may not.
fn check_indices(module: &ast::Module) -> Result<(), CompileError> {
    let mut largest = 0;
    for port in module.inputs.iter().chain(module.outputs.iter()) {
        largest = largest.max(port.width);
    }
    for stmt in &module.statements {
        if let Some(range) = &stmt.target.range {
            largest = largest.max(range.bounds().1);
        }
        largest = largest.max(stmt.expr.max_index());
    }

    if largest > ast::MAX_WIDTH {
        Err(CompileError::IndexOutOfRange(module.name.clone(), largest))
    } else {
        Ok(())
    }
}

fn check_arity(name: &str, expected: usize, found: usize) -> Result<(), CompileError> {
    if expected == found {
        Ok(())
    } else {
        Err(CompileError::Arity(name.to_string(), expected, found))
    }
}

fn bit_length(value: u64) -> usize {
    (64 - value.leading_zeros() as usize).max(1)
}

fn bit_of(value: u64, i: usize) -> bool {
    i < 64 && (value >> i) & 1 == 1
}
