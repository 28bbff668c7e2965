use lavax::mach::{AsmOptions, Event, Runtime};

pub fn load(source: &str) -> Runtime {
    let image = lavax::build(source, &AsmOptions::default()).unwrap();
    let mut runtime = Runtime::default();
    runtime.load(&image).unwrap();
    runtime
}

pub fn exec(runtime: &mut Runtime) -> String {
    exec_n(runtime, 100)
}

pub fn exec_n(runtime: &mut Runtime, batches: usize) -> String {
    let mut s = String::new();
    let mut running = 0;
    loop {
        match runtime.execute() {
            Event::Print(ps) => s.push_str(&ps),
            Event::Running => {
                running += 1;
                if running >= batches {
                    s.push_str("\nQuota exceeded.\n");
                    break;
                }
            }
            Event::AwaitingInput => {
                s.push_str("\n?\n");
                break;
            }
            Event::Fault(fault) => s.push_str(&format!("\n{}\n", fault)),
            Event::Halted => break,
        }
    }
    s
}

/// Build, run to completion and return everything printed.
pub fn output(source: &str) -> String {
    exec(&mut load(source))
}
