use super::*;
use crate::flatten::{Bit, Compilation, CompiledModule, NodeKind};

#[cfg(test)]
mod tests;
pub mod mem;

pub use mem::{Ram, RamBus};

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::*;

/// Upper bound on the number of NAND passes [`Simulator::step`] makes while settling.
/// Circuits without feedback settle in one pass (plus one to confirm).
pub const MAX_SETTLE_PASSES: usize = 100;

/// Where a gate input comes from, resolved to simulator indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Src {
    Node(usize),
    Input(usize),
    Const(bool),
}

#[derive(Debug, Clone, Copy)]
struct Nand {
    out: usize,
    a: Src,
    b: Src,
}

#[derive(Debug, Clone, Copy)]
struct Dff {
    out: usize,
    d: Src,
    clk: Src,
}

#[derive(Debug, Clone, Copy)]
struct Pin {
    offset: usize,
    width: usize,
}

#[derive(Debug, Clone)]
struct BusPins {
    addr: Vec<Src>,
    write_enable: Vec<Src>,
    write_data: Vec<Src>,
    read_data: Pin,
}

/// Runs one compiled module.
///
/// Each node holds one bit: the last computed output of a NAND,
/// or the stored bit of a DFF.
pub struct Simulator {
    name: Name,
    // NANDs in topological order; feedback loops are kept together
    nands: Vec<Nand>,
    dffs: Vec<Dff>,
    inputs: BTreeMap<Name, Pin>,
    outputs: Vec<(Name, Vec<Src>)>,
    signals: BTreeMap<Name, Vec<Src>>,

    values: Vec<bool>,
    input_bits: Vec<bool>,
    prev_clocks: Vec<bool>,
    ticks: u64,

    ram: Ram,
    bus: Option<BusPins>,
}

impl Simulator {
    pub fn new(module: &CompiledModule) -> Simulator {
        let index_by_id: HashMap<usize, usize> = module.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.id, index))
            .collect();

        let src = |bit: Bit| match bit {
            Bit::Node(id) => match index_by_id.get(&id) {
                Some(index) => Src::Node(*index),
                None => {
                    warn!("{}: node {id} is not part of this netlist; using 0", module.name);
                    Src::Const(false)
                },
            },
            Bit::Input(i) => Src::Input(i),
            Bit::Const(b) => Src::Const(b),
            Bit::Forward(_) => Src::Const(false),
        };

        let mut nands = vec![];
        let mut dffs = vec![];
        for (out, node) in module.nodes.iter().enumerate() {
            match node.kind {
                NodeKind::Nand { a, b } => nands.push(Nand { out, a: src(a), b: src(b) }),
                NodeKind::Dff { d, clk } => dffs.push(Dff { out, d: src(d), clk: src(clk) }),
            }
        }
        let nands = order_nands(module.nodes.len(), nands);

        let mut inputs = BTreeMap::new();
        let mut offset = 0;
        for port in &module.inputs {
            inputs.insert(port.name.clone(), Pin { offset, width: port.width });
            offset += port.width;
        }

        let outputs = module.outputs
            .iter()
            .map(|(port, wire)| (port.name.clone(), wire.bits().iter().copied().map(src).collect()))
            .collect();
        let signals = module.signals
            .iter()
            .map(|(name, wire)| (name.clone(), wire.bits().iter().copied().map(src).collect()))
            .collect();

        info!(
            "Simulating {}: {} nands, {} dffs, {} input bits",
            module.name,
            nands.len(),
            dffs.len(),
            module.input_width(),
        );

        Simulator {
            name: module.name.clone(),
            values: vec![false; module.nodes.len()],
            input_bits: vec![false; module.input_width()],
            prev_clocks: vec![false; dffs.len()],
            ticks: 0,
            nands,
            dffs,
            inputs,
            outputs,
            signals,
            ram: Ram::default(),
            bus: None,
        }
    }

    /// Simulates `top`, or the last module defined when `top` is `None`.
    pub fn from_compilation(compilation: &Compilation, top: Option<&str>) -> Result<Simulator, SimError> {
        let module = match top {
            Some(name) => compilation.get(name).ok_or_else(|| SimError::NoSuchModule(name.to_string()))?,
            None => compilation.main().ok_or_else(|| SimError::NoSuchModule("(main)".to_string()))?,
        };
        Ok(Simulator::new(module))
    }

    pub fn with_ram(mut self, ram: Ram) -> Self {
        self.ram = ram;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of calls to [`Simulator::step`] since construction or the last reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.keys().map(|name| name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|(name, _srcs)| name.as_str()).collect()
    }

    pub fn signal_names(&self) -> Vec<&str> {
        self.signals.keys().map(|name| name.as_str()).collect()
    }

    /// Drives an input pin for the following steps. Bit 0 of `value` goes to bit 0 of the pin;
    /// bits beyond the pin's width are ignored.
    pub fn set_input(&mut self, name: &str, value: u64) -> Result<(), SimError> {
        let Pin { offset, width } = *self.inputs.get(name).ok_or_else(|| SimError::NoSuchInput(name.to_string()))?;
        self.drive(offset, width, value);
        Ok(())
    }

    pub fn get_output(&self, name: &str) -> Result<u64, SimError> {
        self.outputs
            .iter()
            .find(|(output, _srcs)| output == name)
            .map(|(_name, srcs)| self.value(srcs))
            .ok_or_else(|| SimError::NoSuchOutput(name.to_string()))
    }

    /// Reads any named signal of the module: inputs, outputs and locals.
    pub fn get_wire(&self, name: &str) -> Result<u64, SimError> {
        self.signals
            .get(name)
            .map(|srcs| self.value(srcs))
            .ok_or_else(|| SimError::NoSuchWire(name.to_string()))
    }

    /// Advances one clock tick:
    /// settle the NANDs, let every DFF whose clock went from 0 to 1 since the previous tick
    /// capture its data, then remember the clocks.
    /// Gates fed by a DFF see the captured value at the next step's settle.
    pub fn step(&mut self) {
        self.ticks += 1;
        trace!("{}: tick {}", self.name, self.ticks);

        self.settle();

        let clocks: Vec<bool> = self.dffs.iter().map(|dff| self.read(dff.clk)).collect();
        let data: Vec<bool> = self.dffs.iter().map(|dff| self.read(dff.d)).collect();
        for (i, dff) in self.dffs.iter().enumerate() {
            if !self.prev_clocks[i] && clocks[i] {
                self.values[dff.out] = data[i];
            }
        }
        self.prev_clocks = clocks;

        self.service_bus();
    }

    pub fn run(&mut self, cycles: usize) {
        for _ in 0..cycles {
            self.step();
        }
    }

    /// Clears every DFF and the clock history, then settles the gates against the cleared state.
    /// Input pins and RAM keep their contents.
    pub fn reset(&mut self) {
        self.values.fill(false);
        self.prev_clocks.fill(false);
        self.ticks = 0;
        self.settle();
        self.drive_read_data();
    }

    /// Copies `bytes` into RAM starting at address 0.
    pub fn load_rom(&mut self, bytes: &[u8]) {
        self.ram.load(bytes);
        self.drive_read_data();
    }

    /// Loads a ROM image from a file into RAM starting at address 0.
    pub fn load_rom_file<P: AsRef<Path>>(&mut self, path: P) -> anyhow::Result<()> {
        self.ram.load_from_file(path)?;
        self.drive_read_data();
        Ok(())
    }

    pub fn read_ram(&self, addr: usize) -> u8 {
        self.ram.read(addr)
    }

    pub fn write_ram(&mut self, addr: usize, byte: u8) {
        self.ram.write(addr, byte);
        self.drive_read_data();
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    /// Connects the RAM to the circuit.
    /// `addr`, `write_enable` and `write_data` may be outputs or any named signal;
    /// `read_data` must be an input.
    pub fn attach_ram_bus(&mut self, bus: &RamBus) -> Result<(), SimError> {
        let lookup = |name: &str| -> Result<Vec<Src>, SimError> {
            self.outputs
                .iter()
                .find(|(output, _srcs)| output == name)
                .map(|(_name, srcs)| srcs.clone())
                .or_else(|| self.signals.get(name).cloned())
                .ok_or_else(|| SimError::NoSuchBusPin(name.to_string()))
        };

        let pins = BusPins {
            addr: lookup(&bus.addr)?,
            write_enable: lookup(&bus.write_enable)?,
            write_data: lookup(&bus.write_data)?,
            read_data: *self.inputs.get(&bus.read_data).ok_or_else(|| SimError::NoSuchBusPin(bus.read_data.clone()))?,
        };
        debug!("{}: ram bus attached ({})", self.name, bus);
        self.bus = Some(pins);
        self.drive_read_data();
        Ok(())
    }

    /// Every named signal and its current value.
    pub fn snapshot(&self) -> Vec<(&str, u64)> {
        self.signals.iter().map(|(name, srcs)| (name.as_str(), self.value(srcs))).collect()
    }

    fn drive(&mut self, offset: usize, width: usize, value: u64) {
        for i in 0..width {
            self.input_bits[offset + i] = i < 64 && (value >> i) & 1 == 1;
        }
    }

    fn read(&self, src: Src) -> bool {
        match src {
            Src::Node(index) => self.values[index],
            Src::Input(index) => self.input_bits[index],
            Src::Const(b) => b,
        }
    }

    fn value(&self, srcs: &[Src]) -> u64 {
        srcs.iter()
            .take(64)
            .enumerate()
            .fold(0, |acc, (i, src)| acc | ((self.read(*src) as u64) << i))
    }

    /// Re-evaluates NANDs until nothing changes. Returns `false` if the pass limit was hit.
    fn settle(&mut self) -> bool {
        for pass in 0..MAX_SETTLE_PASSES {
            let mut changed = false;
            for i in 0..self.nands.len() {
                let Nand { out, a, b } = self.nands[i];
                let value = !(self.read(a) && self.read(b));
                if self.values[out] != value {
                    self.values[out] = value;
                    changed = true;
                }
            }
            if !changed {
                trace!("{}: settled after {} passes", self.name, pass + 1);
                return true;
            }
        }
        warn!("{}: did not settle after {MAX_SETTLE_PASSES} passes", self.name);
        false
    }

    fn service_bus(&mut self) {
        let Some(bus) = &self.bus else { return };
        let addr = self.value(&bus.addr) as usize;
        if self.value(&bus.write_enable) & 1 == 1 {
            let byte = self.value(&bus.write_data) as u8;
            debug!("{}: ram[0x{addr:02x}] <= 0x{byte:02x}", self.name);
            self.ram.write(addr, byte);
        }
        self.drive_read_data();
    }

    fn drive_read_data(&mut self) {
        let Some(bus) = &self.bus else { return };
        let addr = self.value(&bus.addr) as usize;
        let Pin { offset, width } = bus.read_data;
        let byte = self.ram.read(addr);
        self.drive(offset, width, byte as u64);
    }
}

/// Orders NANDs so that every gate comes after the gates driving it,
/// except inside feedback loops, which stay together.
fn order_nands(node_count: usize, nands: Vec<Nand>) -> Vec<Nand> {
    use petgraph::algo::tarjan_scc;
    use petgraph::graph::{DiGraph, NodeIndex};

    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut graph_node: Vec<Option<NodeIndex>> = vec![None; node_count];
    for (i, nand) in nands.iter().enumerate() {
        graph_node[nand.out] = Some(graph.add_node(i));
    }

    for nand in &nands {
        let Some(consumer) = graph_node[nand.out] else { continue };
        for src in [nand.a, nand.b] {
            if let Src::Node(index) = src {
                if let Some(producer) = graph_node[index] {
                    graph.add_edge(producer, consumer, ());
                }
            }
        }
    }

    // tarjan_scc yields components in reverse topological order
    tarjan_scc(&graph)
        .into_iter()
        .rev()
        .flatten()
        .map(|node| nands[graph[node]])
        .collect()
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Simulator({}) at tick {}", self.name, self.ticks)?;
        for (name, value) in self.snapshot() {
            writeln!(f, "    {:>10}   {name}", format!("{value:#x}"))?;
        }
        Ok(())
    }
}
