use crate::sim::{Ram, RamBus, Simulator, MAX_SETTLE_PASSES};
use crate::SimError;

fn simulator(source: &str) -> Simulator {
    let compilation = crate::compile_source(source).unwrap();
    Simulator::from_compilation(&compilation, None).unwrap()
}

const REGISTER: &str = "
module reg(d, clk) -> q:
    q = dff(d, clk)
";

#[test]
fn dff_captures_on_rising_edge() {
    let mut sim = simulator(REGISTER);

    sim.set_input("d", 1).unwrap();
    sim.set_input("clk", 0).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 0);

    sim.set_input("clk", 1).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 1);

    // clock held high: no new edge
    sim.set_input("d", 0).unwrap();
    sim.step();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 1);

    sim.set_input("clk", 0).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 1);

    sim.set_input("clk", 1).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 0);
    assert_eq!(sim.ticks(), 6);
}

#[test]
fn falling_edge_is_ignored() {
    let mut sim = simulator(REGISTER);
    sim.set_input("clk", 1).unwrap();
    sim.step();
    sim.set_input("d", 1).unwrap();
    sim.set_input("clk", 0).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 0);
}

#[test]
fn byte_register() {
    let mut sim = simulator("
module reg8(d:8, clk) -> q:8:
    q = dff(d, clk)
");
    sim.set_input("d", 0xFE).unwrap();
    sim.set_input("clk", 0).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 0);
    sim.set_input("clk", 1).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 0xFE);
}

#[test]
fn inputs_are_truncated_to_width() {
    let mut sim = simulator("
module pass(a:4) -> out:4:
    out = a
");
    sim.set_input("a", 0x1F3).unwrap();
    sim.step();
    assert_eq!(sim.get_output("out").unwrap(), 0x3);
}

#[test]
fn reset_clears_state() {
    let mut sim = simulator(REGISTER);
    sim.set_input("d", 1).unwrap();
    sim.set_input("clk", 1).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 1);

    sim.reset();
    assert_eq!(sim.get_output("q").unwrap(), 0);
    assert_eq!(sim.ticks(), 0);
    sim.reset();
    assert_eq!(sim.get_output("q").unwrap(), 0);

    // inputs survive and the clock history is cleared, so the next step is an edge again
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 1);
}

#[test]
fn sr_latch_holds() {
    let mut sim = simulator("
module latch(s, r) -> q:
    q = nand(s, qn)
    qn = nand(r, q)
");
    sim.set_input("s", 0).unwrap();
    sim.set_input("r", 1).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 1);

    sim.set_input("s", 1).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 1);

    sim.set_input("r", 0).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 0);

    sim.set_input("r", 1).unwrap();
    sim.step();
    assert_eq!(sim.get_output("q").unwrap(), 0);
}

#[test]
fn oscillator_hits_pass_limit() {
    let mut sim = simulator("
module osc(en) -> q:
    q = nand(en, q)
");
    sim.set_input("en", 1).unwrap();
    assert!(!sim.settle());
    sim.step();
    assert_eq!(sim.ticks(), 1);
    assert!(MAX_SETTLE_PASSES > 1);

    sim.set_input("en", 0).unwrap();
    assert!(sim.settle());
    assert_eq!(sim.get_output("q").unwrap(), 1);
}

#[test]
fn named_wires() {
    let mut sim = simulator("
module buf(a) -> out:
    t = nand(a, a)
    out = nand(t, t)
");
    sim.set_input("a", 1).unwrap();
    sim.step();
    assert_eq!(sim.get_wire("t").unwrap(), 0);
    assert_eq!(sim.get_wire("a").unwrap(), 1);
    assert_eq!(sim.get_wire("out").unwrap(), 1);
    assert_eq!(sim.get_wire("nope"), Err(SimError::NoSuchWire("nope".to_string())));
}

#[test]
fn unknown_pins() {
    let mut sim = simulator(REGISTER);
    assert_eq!(sim.set_input("x", 1), Err(SimError::NoSuchInput("x".to_string())));
    assert_eq!(sim.get_output("d"), Err(SimError::NoSuchOutput("d".to_string())));
    assert_eq!(sim.input_names(), vec!["clk", "d"]);
    assert_eq!(sim.output_names(), vec!["q"]);
    assert_eq!(sim.name(), "reg");
}

#[test]
fn choose_top() {
    let compilation = crate::compile_source("
module not(a) -> out:
    out = nand(a, a)
module buf(a) -> out:
    out = not(not(a))
").unwrap();

    let sim = Simulator::from_compilation(&compilation, None).unwrap();
    assert_eq!(sim.name(), "buf");

    let mut sim = Simulator::from_compilation(&compilation, Some("not")).unwrap();
    sim.set_input("a", 0).unwrap();
    sim.step();
    assert_eq!(sim.get_output("out").unwrap(), 1);

    assert_eq!(
        Simulator::from_compilation(&compilation, Some("xor")).unwrap_err(),
        SimError::NoSuchModule("xor".to_string()),
    );
}

const MEMORY_PORT: &str = "
module port(a:8, we, data:8, read_data:8) -> (addr:8, write_enable, write_data:8, out:8):
    addr = a
    write_enable = we
    write_data = data
    out = read_data
";

#[test]
fn ram_bus_write_then_read() {
    let mut sim = simulator(MEMORY_PORT);
    sim.attach_ram_bus(&RamBus::default()).unwrap();

    sim.set_input("a", 3).unwrap();
    sim.set_input("we", 1).unwrap();
    sim.set_input("data", 0x42).unwrap();
    sim.step();
    assert_eq!(sim.read_ram(3), 0x42);
    assert_eq!(sim.get_output("out").unwrap(), 0x42);

    sim.set_input("we", 0).unwrap();
    sim.set_input("a", 4).unwrap();
    sim.step();
    assert_eq!(sim.get_output("out").unwrap(), 0);

    // ram survives reset
    sim.reset();
    assert_eq!(sim.read_ram(3), 0x42);
}

#[test]
fn rom_image() {
    let mut sim = simulator(MEMORY_PORT).with_ram(Ram::new(16));
    sim.load_rom(&[1, 2, 3]);
    assert_eq!(sim.read_ram(2), 3);
    assert_eq!(sim.read_ram(18), 3);
    sim.write_ram(5, 9);
    assert_eq!(sim.ram().read(5), 9);
}

#[test]
fn rom_file() {
    let path = std::env::temp_dir().join(format!("wire-rom-{}.bin", std::process::id()));
    std::fs::write(&path, [7, 8, 9]).unwrap();

    let mut sim = simulator(MEMORY_PORT);
    sim.attach_ram_bus(&RamBus::default()).unwrap();
    sim.load_rom_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(sim.read_ram(1), 8);
    // read_data follows the current address right away
    assert_eq!(sim.get_output("out").unwrap(), 7);

    assert!(sim.load_rom_file(std::env::temp_dir().join("wire-no-such-rom.bin")).is_err());
}

#[test]
fn reset_settles_gates() {
    let mut sim = simulator("
module not(a) -> out:
    out = nand(a, a)
");
    sim.set_input("a", 0).unwrap();
    assert_eq!(sim.get_output("out").unwrap(), 0);
    sim.reset();
    assert_eq!(sim.get_output("out").unwrap(), 1);
}

#[test]
fn missing_bus_pins() {
    let mut sim = simulator(REGISTER);
    assert_eq!(
        sim.attach_ram_bus(&RamBus::default()),
        Err(SimError::NoSuchBusPin("addr".to_string())),
    );
}
