use super::*;
use crate::flatten::Compilation;
use crate::sim::{RamBus, Simulator};
use crate::testbench::*;

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use log::*;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Prompt history file, unless `WIRE_HISTORY` names another.
pub const HISTORY_FILE: &str = ".wire_history";

pub fn history_path() -> PathBuf {
    history_path_from(std::env::var_os("WIRE_HISTORY"))
}

fn history_path_from(var: Option<OsString>) -> PathBuf {
    match var {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(HISTORY_FILE),
    }
}

/// Makes Ctrl-C stop a long `run` instead of killing the process.
pub fn install_interrupt_handler() {
    let result = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst));
    if let Err(err) = result {
        debug!("Interrupt handler not installed: {err}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Executes testbench commands against a simulator, from a script or interactively.
pub struct Repl {
    compilation: Compilation,
    sim: Simulator,
    testbench: Testbench,
    failures: usize,
}

impl Repl {
    pub fn new(compilation: Compilation, sim: Simulator, testbench: Testbench) -> Repl {
        Repl {
            compilation,
            sim,
            testbench,
            failures: 0,
        }
    }

    pub fn sim(&self) -> &Simulator {
        &self.sim
    }

    /// Number of failed `assert` commands so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Runs the testbench script to the end or until `quit`.
    pub fn run(&mut self) -> anyhow::Result<Flow> {
        let commands = self.testbench.commands.clone();
        for (line, command) in commands {
            trace!("testbench line {line}: {command}");
            if self.exec(command)? == Flow::Quit {
                return Ok(Flow::Quit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Reads commands from the terminal until `debug`, `quit` or end of input.
    pub fn interactive(&mut self) -> anyhow::Result<Flow> {
        install_interrupt_handler();
        let mut readline = rustyline::DefaultEditor::new()?;
        let history = history_path();
        if let Err(err) = readline.load_history(&history) {
            debug!("No history loaded from {}: {err}", history.display());
        }

        let flow = self.prompt(&mut readline);
        if let Err(err) = readline.save_history(&history) {
            warn!("Could not save history to {}: {err}", history.display());
        }
        flow
    }

    fn prompt(&mut self, readline: &mut rustyline::DefaultEditor) -> anyhow::Result<Flow> {
        loop {
            let line = match readline.readline(&format!("{}> ", self.sim.name())) {
                Ok(line) => line,
                Err(rustyline::error::ReadlineError::Interrupted) => continue,
                Err(rustyline::error::ReadlineError::Eof) => return Ok(Flow::Quit),
                Err(err) => return Err(err.into()),
            };
            readline.add_history_entry(line.as_str())?;

            match parse_testbench_command(&line) {
                Ok(None) => (),
                Ok(Some(TestbenchCommand::Debug)) => return Ok(Flow::Continue),
                Ok(Some(command)) => match self.exec(command) {
                    Ok(Flow::Quit) => return Ok(Flow::Quit),
                    Ok(Flow::Continue) => (),
                    Err(err) => eprintln!("{err}"),
                },
                Err(message) => eprintln!("{message}"),
            }
        }
    }

    pub fn exec(&mut self, command: TestbenchCommand) -> anyhow::Result<Flow> {
        match command {
            TestbenchCommand::Top(name) => {
                let sim = Simulator::from_compilation(&self.compilation, Some(name.as_str()))?;
                let ram = self.sim.ram().clone();
                self.sim = sim.with_ram(ram);
                attach_default_bus(&mut self.sim);
                println!("TOP {name}");
            },
            TestbenchCommand::Poke(name, value) => {
                println!("POKE {name} <= {value}");
                self.sim.set_input(&name, value)?;
            },
            TestbenchCommand::Peek(name) => {
                let value = self.peek(&name)?;
                println!("PEEK {name} => {value} ({value:#x})");
            },
            TestbenchCommand::Step => self.sim.step(),
            TestbenchCommand::Run(cycles) => {
                INTERRUPTED.store(false, Ordering::SeqCst);
                for i in 0..cycles {
                    if INTERRUPTED.swap(false, Ordering::SeqCst) {
                        println!("Interrupted after {i} steps");
                        break;
                    }
                    self.sim.step();
                }
            },
            TestbenchCommand::Reset => {
                println!("RESET");
                self.sim.reset();
            },
            TestbenchCommand::Assert(name, expected) => {
                let actual = self.peek(&name)?;
                if actual == expected {
                    println!("ASSERT {name} == {expected}");
                } else {
                    self.failures += 1;
                    println!("Assertion failed: {name} is {actual} ({actual:#x}), expected {expected} ({expected:#x})");
                }
            },
            TestbenchCommand::Show => self.show(),
            TestbenchCommand::Rom(filename) => {
                println!("ROM {filename}");
                self.sim.load_rom_file(&filename)?;
            },
            TestbenchCommand::Ram(None) => println!("{}", self.sim.ram().render()),
            TestbenchCommand::Ram(Some(addr)) => {
                let byte = self.sim.read_ram(addr);
                println!("RAM[{addr:#04x}] => {byte:#04x}");
            },
            TestbenchCommand::Debug => return self.interactive(),
            TestbenchCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn peek(&self, name: &str) -> Result<u64, SimError> {
        self.sim.get_output(name).or_else(|_| self.sim.get_wire(name))
    }

    fn show(&self) {
        println!("{} at tick {}", self.sim.name(), self.sim.ticks());
        for (name, value) in self.sim.snapshot() {
            println!("    {name:>16} = {value} ({value:#x})");
        }
    }
}

/// Binds the RAM to `addr`/`write_enable`/`write_data`/`read_data` when the module has all four.
pub fn attach_default_bus(sim: &mut Simulator) -> bool {
    match sim.attach_ram_bus(&RamBus::default()) {
        Ok(()) => true,
        Err(err) => {
            debug!("{}: no ram bus ({err})", sim.name());
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "
module not(a) -> out:
    out = nand(a, a)
module reg8(d:8, clk) -> q:8:
    q = dff(d, clk)
";

    fn repl(script: &str) -> Repl {
        let compilation = crate::compile_source(SOURCE).unwrap();
        let sim = Simulator::from_compilation(&compilation, None).unwrap();
        let testbench = parse_testbench(script).unwrap();
        Repl::new(compilation, sim, testbench)
    }

    #[test]
    fn script_runs() {
        let mut repl = repl("
poke d 0xFE
poke clk 0
step
poke clk 1
step
assert q 0xFE
assert q 0
");
        assert_eq!(repl.run().unwrap(), Flow::Continue);
        assert_eq!(repl.failures(), 1);
        assert_eq!(repl.sim().get_output("q").unwrap(), 0xFE);
    }

    #[test]
    fn switch_top() {
        let mut repl = repl("top not\npoke a 0\nstep\nassert out 1\n");
        repl.run().unwrap();
        assert_eq!(repl.sim().name(), "not");
        assert_eq!(repl.failures(), 0);
    }

    #[test]
    fn quit_stops_script() {
        let mut repl = repl("poke clk 1\nquit\nstep\n");
        assert_eq!(repl.run().unwrap(), Flow::Quit);
        assert_eq!(repl.sim().ticks(), 0);
    }

    #[test]
    fn run_and_reset() {
        let mut repl = repl("run 5\nreset\nrun 2\n");
        repl.run().unwrap();
        assert_eq!(repl.sim().ticks(), 2);
    }

    #[test]
    fn history_file_location() {
        assert_eq!(history_path_from(None), PathBuf::from(".wire_history"));
        assert_eq!(history_path_from(Some(OsString::new())), PathBuf::from(".wire_history"));
        assert_eq!(history_path_from(Some("/tmp/wire.hist".into())), PathBuf::from("/tmp/wire.hist"));
    }

    #[test]
    fn rom_command_loads_file() {
        let path = std::env::temp_dir().join(format!("wire-repl-rom-{}.bin", std::process::id()));
        std::fs::write(&path, [0xAB]).unwrap();
        let mut loaded = repl(&format!("rom {}\n", path.display()));
        loaded.run().unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.sim().read_ram(0), 0xAB);

        let mut missing = repl("rom /nonexistent/wire.rom\n");
        assert!(missing.run().is_err());
    }

    #[test]
    fn unknown_pin_is_an_error() {
        let mut repl = repl("poke nope 1\n");
        assert!(repl.run().is_err());
    }
}
