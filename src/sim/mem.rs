/// A byte-addressed memory the simulator services once per step.
/// Addresses wrap around the memory size.
#[derive(Debug, Clone)]
pub struct Ram {
    mem: Vec<u8>,
}

/// Names of the pins which connect a [`Ram`] to a circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamBus {
    pub addr: String,
    pub write_enable: String,
    pub write_data: String,
    pub read_data: String,
}

impl Ram {
    pub const DEFAULT_SIZE: usize = 256;

    pub fn new(size: usize) -> Ram {
        Ram {
            mem: vec![0; size.max(1)],
        }
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Copies `data` to the start of memory. Anything past the end is dropped.
    pub fn load(&mut self, data: &[u8]) {
        let len = data.len().min(self.mem.len());
        if len < data.len() {
            log::warn!("Ram: image of {} bytes truncated to {len}", data.len());
        }
        self.mem[..len].copy_from_slice(&data[..len]);
    }

    pub fn load_from_file<P: AsRef<std::path::Path>>(&mut self, path: P) -> anyhow::Result<()> {
        let data = std::fs::read(&path)?;
        log::info!("Loaded {} bytes from {}", data.len(), path.as_ref().display());
        self.load(&data);
        Ok(())
    }

    pub fn read(&self, addr: usize) -> u8 {
        self.mem[addr % self.mem.len()]
    }

    pub fn write(&mut self, addr: usize, byte: u8) {
        let len = self.mem.len();
        self.mem[addr % len] = byte;
    }

    pub fn render(&self) -> String {
        let mut lines = vec![];
        for (row, chunk) in self.mem.chunks(16).enumerate() {
            let bytes: Vec<String> = chunk.iter().map(|byte| format!("{byte:02x}")).collect();
            lines.push(format!("{:04x}: {}", row * 16, bytes.join(" ")));
        }
        lines.join("\n")
    }
}

impl Default for Ram {
    fn default() -> Ram {
        Ram::new(Ram::DEFAULT_SIZE)
    }
}

impl Default for RamBus {
    fn default() -> RamBus {
        RamBus {
            addr: "addr".to_string(),
            write_enable: "write_enable".to_string(),
            write_data: "write_data".to_string(),
            read_data: "read_data".to_string(),
        }
    }
}

impl std::fmt::Display for RamBus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "addr={} write_enable={} write_data={} read_data={}", self.addr, self.write_enable, self.write_data, self.read_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_wrap() {
        let mut ram = Ram::new(4);
        ram.write(5, 0xab);
        assert_eq!(ram.read(1), 0xab);
        assert_eq!(ram.read(9), 0xab);
    }

    #[test]
    fn load_truncates() {
        let mut ram = Ram::new(2);
        ram.load(&[1, 2, 3]);
        assert_eq!(ram.read(0), 1);
        assert_eq!(ram.read(1), 2);
        assert_eq!(ram.size(), 2);
    }

    #[test]
    fn render_rows() {
        let mut ram = Ram::new(17);
        ram.write(16, 0xff);
        assert_eq!(ram.render(), format!("0000: {}\n0010: ff", vec!["00"; 16].join(" ")));
    }
}
