use crate::mach::{assemble, AsmOptions, Event, Runtime};

mod machine_test;
mod syscall_test;

fn load(source: &str) -> Runtime {
    let image = assemble(source, &AsmOptions::default()).unwrap();
    let mut runtime = Runtime::default();
    runtime.load(&image).unwrap();
    runtime
}

fn run(runtime: &mut Runtime) -> String {
    run_batches(runtime, 100)
}

fn run_batches(runtime: &mut Runtime, batches: usize) -> String {
    let mut s = String::new();
    let mut count = 0;
    loop {
        match runtime.execute() {
            Event::Print(ps) => s.push_str(&ps),
            Event::Running => {
                count += 1;
                if count >= batches {
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
