use wire::repl::*;
use wire::sim::Simulator;
use wire::testbench::*;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    filename: String,

    #[arg(long)]
    tb: Option<String>,

    #[arg(long)]
    top: Option<String>,

    /// Bytes to load into RAM before the first step.
    #[arg(long)]
    rom: Option<String>,

    #[arg(long, default_value_t = false)]
    dump_ast: bool,

    #[arg(long, default_value_t = false)]
    dump_netlist: bool,

    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug)?;

    let text = std::fs::read_to_string(&args.filename)?;

    let modules = match wire::parser::parse_source(&text) {
        Ok(modules) => modules,
        Err(err) => {
            eprintln!("Compilation failed: {err}");
            std::process::exit(1);
        },
    };
    if args.dump_ast {
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    let compilation = match wire::flatten::compile(&modules) {
        Ok(compilation) => compilation,
        Err(err) => {
            eprintln!("Compilation failed: {err}");
            std::process::exit(1);
        },
    };
    if args.dump_netlist {
        println!("{}", serde_json::to_string_pretty(&compilation)?);
        return Ok(());
    }

    let testbench_filename = args.tb.or_else(|| testbench_for(&args.filename));
    let testbench = if let Some(tb_filename) = testbench_filename {
        println!("Using testbench file: {tb_filename}");
        Testbench::from_file(&tb_filename)?
    } else {
        println!("No testbench file");
        Testbench {
            commands: vec![(0, TestbenchCommand::Debug)],
        }
    };

    let mut sim = Simulator::from_compilation(&compilation, args.top.as_deref())?;
    if let Some(rom) = &args.rom {
        sim.load_rom_file(rom)?;
    }
    attach_default_bus(&mut sim);

    let mut repl = Repl::new(compilation, sim, testbench);
    repl.run()?;

    if repl.failures() > 0 {
        eprintln!("{} assertions failed.", repl.failures());
        std::process::exit(1);
    }
    Ok(())
}

fn testbench_for(filename: &str) -> Option<String> {
    let path = std::path::Path::new(filename);
    let parent = path.parent()?;
    let file = format!("{}.tb", path.file_stem()?.to_str()?);
    let tb_filename = parent.join(file).into_os_string().into_string().ok()?;
    let exists = std::fs::metadata(&tb_filename).map(|metadata| metadata.is_file()).unwrap_or(false);

    if exists {
        Some(tb_filename)
    } else {
        None
    }
}

fn init_logging(debug: bool) -> anyhow::Result<()> {
    use chrono::{DateTime, Utc};

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            let now: DateTime<Utc> = Utc::now();
            out.finish(format_args!(
                "[{} {} {}] {}",
                now.format("%Y-%m-%dT%H:%M:%S%.fZ"),
                record.level(),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    let level = std::env::var("LEVEL").unwrap_or_default();

    if debug || level == "DEBUG" {
        dispatch = dispatch.level(log::LevelFilter::Debug);
    } else if level == "TRACE" {
        dispatch = dispatch.level(log::LevelFilter::Trace);
    } else {
        dispatch = dispatch.level(log::LevelFilter::Info);
    }

    dispatch.apply()?;
    Ok(())
}
