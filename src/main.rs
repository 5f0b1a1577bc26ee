use rrsched::{
    launch, log, log_fatal, parse_args, set_log_file, SchedulerConfig, PROGRAM_NAME,
    PROGRAM_VERSION,
};
use std::process;

fn main() {
    let workers = parse_args();

    let config = match SchedulerConfig::from_env(workers) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    if let Some(log_file) = &config.log_file {
        set_log_file(log_file);
    }

    let _ = log(&format!(
        "{} {} starting with {} workers, controller PID {}",
        PROGRAM_NAME,
        PROGRAM_VERSION,
        config.workers,
        process::id()
    ));

    match launch(&config) {
        Ok(report) => {
            let _ = log(&report.summary());
            if !report.all_succeeded() {
                let _ = log("Not every worker persisted its count cleanly");
            }
            println!("All workers finished. Controller exiting.");
        }
        Err(e) => {
            let _ = log_fatal(&format!("[{}] {}", e.as_label(), e));
            process::exit(1);
        }
    }
}
