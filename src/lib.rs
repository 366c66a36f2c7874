//! Wire: a hardware description language with two primitives,
//! `nand` and the rising-edge flip-flop `dff`.
//! Every other gate is a module built out of those.
//!
//! The pipeline is:
//! [`lexer::lex`] → [`parser::parse`] → [`flatten::compile`] → [`sim::Simulator`].
//!
//! ```
//! use wire::sim::Simulator;
//!
//! let source = "
//! module not(a) -> out:
//!     out = nand(a, a)
//! ";
//! let compilation = wire::compile_source(source).unwrap();
//! let mut sim = Simulator::from_compilation(&compilation, None).unwrap();
//! sim.set_input("a", 0).unwrap();
//! sim.step();
//! assert_eq!(sim.get_output("out").unwrap(), 1);
//! ```
use log::*;

pub mod ast;
pub mod context;
pub mod error;
pub mod flatten;
pub mod lexer;
pub mod loc;
pub mod parser;
pub mod repl;
pub mod sim;
pub mod testbench;


pub use error::*;
pub use loc::*;

pub type Name = String;

/// Lexes, parses and compiles `source` in a fresh elaboration context.
pub fn compile_source(source: &str) -> Result<flatten::Compilation, WireError> {
    let modules = parser::parse_source(source)?;
    info!("Parsed {} modules", modules.len());
    Ok(flatten::compile(&modules)?)
}
