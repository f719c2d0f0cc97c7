//! statewire CLI - check, generate and trace state machines from the command line

use statewire::{
    generate_code, messaging_header, parse_graph_source, ConditionId, Entity, Graph, Message,
    Settings, StateId, SymbolTable, TraceDecoder, TraceObserver, TransitionId,
};
use std::env;
use std::fs;
use std::process::ExitCode;

fn usage() {
    println!("statewire CLI - state machine firmware generator");
    println!("Usage:");
    println!("  statewire-cli check <file.fsm>");
    println!("  statewire-cli generate <file.fsm> [--logging] [--config settings.json]");
    println!("  statewire-cli header");
    println!("  statewire-cli decode <file.fsm> <capture.bin> [--config settings.json]");
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        usage();
        return ExitCode::SUCCESS;
    };

    let result = match command.as_str() {
        "check" => positional(&args, 1).and_then(check),
        "generate" => positional(&args, 1).and_then(|file| generate(file, &args)),
        "header" => {
            print!("{}", messaging_header());
            Ok(())
        }
        "decode" => positional(&args, 1)
            .and_then(|file| positional(&args, 2).map(|capture| (file, capture)))
            .and_then(|(file, capture)| decode(file, capture, &args)),
        other => Err(format!("Unknown command '{}'", other)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("❌ {}", message);
            ExitCode::FAILURE
        }
    }
}

/// The `index`th argument that is neither a flag nor a flag's value
fn positional(args: &[String], index: usize) -> Result<&str, String> {
    let mut found = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            iter.next();
        } else if !arg.starts_with("--") {
            found.push(arg.as_str());
        }
    }
    found
        .get(index)
        .copied()
        .ok_or_else(|| "Missing argument, run without arguments for usage".to_string())
}

fn settings(args: &[String]) -> Result<Settings, String> {
    match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .ok_or_else(|| "--config needs a file".to_string())?;
            Settings::load(path).map_err(|e| format!("{}: {}", path, e))
        }
        None => Ok(Settings::default()),
    }
}

fn load_graph(filename: &str) -> Result<Graph, String> {
    let content = fs::read_to_string(filename)
        .map_err(|e| format!("Could not read file '{}': {}", filename, e))?;
    parse_graph_source(&content).map_err(|e| format!("Parse error: {}", e))
}

fn check(filename: &str) -> Result<(), String> {
    let graph = load_graph(filename)?;
    println!("✅ Successfully parsed FSM {}", graph.name);
    println!("  States: {}", graph.states().len());
    for state in graph.states() {
        match &state.description {
            Some(description) => println!("    - {} ({})", state.name, description),
            None => println!("    - {}", state.name),
        }
    }
    println!("  Transitions: {}", graph.transitions().len());
    for t in graph.transitions() {
        let name = |id| graph.state(id).map(|s| s.name.as_str()).unwrap_or("?");
        println!("    {} --> {} : {}", name(t.source()), name(t.target()), t.label());
    }
    if let Some(initial) = graph.initial_state() {
        println!("  Initial State: {}", initial.name);
    }

    graph.validate().map_err(|errors| {
        for error in &errors {
            eprintln!("  ⚠ {}", error);
        }
        format!("{} validation problem(s)", errors.len())
    })
}

fn generate(filename: &str, args: &[String]) -> Result<(), String> {
    let graph = load_graph(filename)?;
    let mut options = settings(args)?.generator;
    if args.iter().any(|a| a == "--logging") {
        options.logging = true;
    }
    let code = generate_code(&graph, &mut SymbolTable::new(), &options)
        .map_err(|e| format!("Generation failed: {}", e))?;
    print!("{}", code.code());
    Ok(())
}

/// Prints events with entity names
struct Printer<'g> {
    graph: &'g Graph,
}

impl Printer<'_> {
    fn name(&self, entity: Entity) -> String {
        self.graph
            .describe(entity)
            .unwrap_or_else(|| entity.to_string())
    }
}

impl TraceObserver for Printer<'_> {
    fn iteration_started(&mut self) {
        println!("--- iteration");
    }

    fn current_state(&mut self, state: StateId) {
        println!("state      {}", self.name(Entity::State(state)));
    }

    fn will_check_condition(&mut self, transition: TransitionId, condition: ConditionId) {
        println!(
            "check      {} ({})",
            self.name(Entity::Condition(condition)),
            self.name(Entity::Transition(transition))
        );
    }

    fn will_perform_transition(&mut self, transition: TransitionId) {
        println!("transition {}", self.name(Entity::Transition(transition)));
    }

    fn will_perform_action(&mut self, transition: TransitionId, index: u16) {
        let action = self
            .graph
            .transition(transition)
            .and_then(|t| t.actions().get(usize::from(index)))
            .map(|a| a.name.clone())
            .unwrap_or_else(|| format!("#{}", index));
        println!("action     {}", action);
    }

    fn unresolved_symbol(&mut self, message: &Message, id: u16) {
        println!("stale      symbol {} in {:?}", id, message);
    }

    fn unframed_bytes(&mut self, bytes: &[u8]) {
        print!("{}", String::from_utf8_lossy(bytes));
    }
}

fn decode(filename: &str, capture: &str, args: &[String]) -> Result<(), String> {
    let graph = load_graph(filename)?;
    let settings = settings(args)?;

    // Symbols come from generation, the same way the firmware got them
    let symbols = SymbolTable::new().shared();
    generate_code(&graph, &mut symbols.write(), &settings.generator)
        .map_err(|e| format!("Generation failed: {}", e))?;

    let mut file =
        fs::File::open(capture).map_err(|e| format!("Could not open '{}': {}", capture, e))?;
    let mut decoder = TraceDecoder::new(symbols, settings.decoder);
    let mut printer = Printer { graph: &graph };
    decoder
        .pump(&mut file, &mut printer)
        .map_err(|e| format!("Could not read '{}': {}", capture, e))?;

    let stats = decoder.stats();
    println!();
    println!(
        "✅ {} frames, {} bytes skipped, {} headers rejected, {} malformed, {} stale",
        stats.frames,
        stats.discarded_bytes,
        stats.rejected_headers,
        stats.malformed_frames,
        decoder.unresolved()
    );
    Ok(())
}
