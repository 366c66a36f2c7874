use super::*;

/// A script of simulator commands, one per line.
/// `#` and `;` start a comment which runs to the end of the line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Testbench {
    pub commands: Vec<(usize, TestbenchCommand)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestbenchCommand {
    Top(Name),
    Poke(Name, u64),
    Peek(Name),
    Step,
    Run(usize),
    Reset,
    Assert(Name, u64),
    Show,
    Rom(String),
    Ram(Option<usize>),
    Debug,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestbenchError {
    pub line: usize,
    pub message: String,
}

impl Testbench {
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Testbench> {
        let text = std::fs::read_to_string(&path)?;
        Ok(parse_testbench(&text)?)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

pub fn parse_testbench(text: &str) -> Result<Testbench, TestbenchError> {
    let mut commands = vec![];
    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let command = parse_testbench_command(line).map_err(|message| TestbenchError { line: line_no, message })?;
        if let Some(command) = command {
            commands.push((line_no, command));
        }
    }
    Ok(Testbench { commands })
}

/// Parses a single line. Blank and comment-only lines are `Ok(None)`.
pub fn parse_testbench_command(line: &str) -> Result<Option<TestbenchCommand>, String> {
    let line = match line.find(|ch: char| ch == '#' || ch == ';') {
        Some(index) => &line[..index],
        None => line,
    };
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&keyword, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (keyword, args) {
        ("top", [name]) => TestbenchCommand::Top(name.to_string()),
        ("poke", [name, value]) => TestbenchCommand::Poke(name.to_string(), value_arg(value)?),
        ("peek", [name]) => TestbenchCommand::Peek(name.to_string()),
        ("step", []) => TestbenchCommand::Step,
        ("run", []) => TestbenchCommand::Run(1),
        ("run", [cycles]) => TestbenchCommand::Run(value_arg(cycles)? as usize),
        ("reset", []) => TestbenchCommand::Reset,
        ("assert", [name, value]) => TestbenchCommand::Assert(name.to_string(), value_arg(value)?),
        ("show", []) => TestbenchCommand::Show,
        ("rom", [filename]) => TestbenchCommand::Rom(filename.to_string()),
        ("ram", []) => TestbenchCommand::Ram(None),
        ("ram", [addr]) => TestbenchCommand::Ram(Some(value_arg(addr)? as usize)),
        ("debug", []) => TestbenchCommand::Debug,
        ("quit" | "exit", []) => TestbenchCommand::Quit,
        ("top" | "poke" | "peek" | "step" | "run" | "reset" | "assert" | "show" | "rom" | "ram" | "debug" | "quit" | "exit", _) => {
            return Err(format!("Wrong number of arguments to {keyword}: {}", args.len()));
        },
        _ => return Err(format!("Unknown command: {keyword}")),
    };
    Ok(Some(command))
}

/// Parses a decimal, `0x` hex or `0b` binary number.
pub fn parse_value(text: &str) -> Option<u64> {
    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(digits, 16).ok()
    } else if let Some(digits) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        u64::from_str_radix(digits, 2).ok()
    } else {
        text.parse().ok()
    }
}

fn value_arg(text: &str) -> Result<u64, String> {
    parse_value(text).ok_or_else(|| format!("Invalid value: {text}"))
}

impl std::fmt::Display for TestbenchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TestbenchCommand::Top(name) => write!(f, "top {name}"),
            TestbenchCommand::Poke(name, value) => write!(f, "poke {name} {value}"),
            TestbenchCommand::Peek(name) => write!(f, "peek {name}"),
            TestbenchCommand::Step => write!(f, "step"),
            TestbenchCommand::Run(cycles) => write!(f, "run {cycles}"),
            TestbenchCommand::Reset => write!(f, "reset"),
            TestbenchCommand::Assert(name, value) => write!(f, "assert {name} {value}"),
            TestbenchCommand::Show => write!(f, "show"),
            TestbenchCommand::Rom(filename) => write!(f, "rom {filename}"),
            TestbenchCommand::Ram(None) => write!(f, "ram"),
            TestbenchCommand::Ram(Some(addr)) => write!(f, "ram {addr}"),
            TestbenchCommand::Debug => write!(f, "debug"),
            TestbenchCommand::Quit => write!(f, "quit"),
        }
    }
}

impl std::fmt::Display for TestbenchError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "testbench line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for TestbenchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values() {
        assert_eq!(parse_value("42"), Some(42));
        assert_eq!(parse_value("0xFe"), Some(0xfe));
        assert_eq!(parse_value("0b101"), Some(5));
        assert_eq!(parse_value("0b2"), None);
        assert_eq!(parse_value("x"), None);
    }

    #[test]
    fn script() {
        let testbench = parse_testbench("
# register test
top reg8
poke d 0xFE ; load
poke clk 0
step

poke clk 1
run 2
assert q 254
").unwrap();
        assert_eq!(
            testbench.commands,
            vec![
                (3, TestbenchCommand::Top("reg8".to_string())),
                (4, TestbenchCommand::Poke("d".to_string(), 0xfe)),
                (5, TestbenchCommand::Poke("clk".to_string(), 0)),
                (6, TestbenchCommand::Step),
                (8, TestbenchCommand::Poke("clk".to_string(), 1)),
                (9, TestbenchCommand::Run(2)),
                (10, TestbenchCommand::Assert("q".to_string(), 254)),
            ],
        );
    }

    #[test]
    fn bad_lines() {
        let error = parse_testbench("step\npoke d\n").unwrap_err();
        assert_eq!(error.line, 2);
        assert_eq!(error.message, "Wrong number of arguments to poke: 1");

        assert_eq!(parse_testbench_command("frob").unwrap_err(), "Unknown command: frob");
        assert_eq!(parse_testbench_command("poke d zz").unwrap_err(), "Invalid value: zz");
        assert_eq!(parse_testbench_command("   # nothing"), Ok(None));
    }

    #[test]
    fn commands_print_as_parsed() {
        for line in ["top cpu", "poke a 3", "run 10", "ram 16", "ram", "assert q 1", "rom boot.bin"] {
            let command = parse_testbench_command(line).unwrap().unwrap();
            assert_eq!(command.to_string(), line);
        }
    }
}
