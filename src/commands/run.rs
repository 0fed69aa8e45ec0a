//! Implementation of the `taskrun run` and `taskrun describe` commands.

use crate::cli::RunArgs;
use std::io::Write;
use std::sync::Arc;
use std::sync::mpsc;
use taskrun::error::{Result, TaskError};
use taskrun::{Settings, Task};

/// Execute the `taskrun run` command.
///
/// Streams output to this process unless `--capture` is given, in which
/// case the captured text is printed once the pipeline finished.
pub fn cmd_run(args: RunArgs, settings: Arc<Settings>) -> Result<i32> {
    let capture = args.capture;
    let async_run = args.async_run;
    let head = build_pipeline(args, settings)?;

    if capture {
        let output = head.run_for_output()?;
        print!("{}", output.stdout);
        eprint!("{}", output.stderr);
        let _ = std::io::stdout().flush();
        return Ok(output.code);
    }

    if async_run {
        let (tx, rx) = mpsc::channel();
        head.run_async(true, move |code| {
            let _ = tx.send(code);
        })?;
        return rx.recv().map_err(|e| {
            TaskError::io(
                "pipeline finished without reporting an exit code",
                std::io::Error::other(e),
            )
        });
    }

    head.run(true)
}

/// Execute the `taskrun describe` command.
pub fn cmd_describe(args: RunArgs, settings: Arc<Settings>) -> Result<i32> {
    let head = build_pipeline(args, settings)?;
    println!("{}", head.description());
    Ok(0)
}

/// Build the pipeline: the trailing command plus one stage per `--pipe`.
///
/// Directory, environment, and exit-on-failure apply to every stage.
fn build_pipeline(args: RunArgs, settings: Arc<Settings>) -> Result<Task> {
    let RunArgs {
        dir,
        env,
        exit_on_failure,
        pipes,
        command,
        ..
    } = args;

    let configure = |words: Vec<String>| -> Result<Task> {
        let mut words = words.into_iter();
        let name = words.next().ok_or_else(|| TaskError::InvalidPipe {
            command: String::new(),
            reason: "stage is empty".to_string(),
        })?;
        let task = match &dir {
            Some(dir) => Task::with_dir(name, dir),
            None => Task::new(name),
        };
        let mut task = task
            .with_settings(Arc::clone(&settings))
            .args(words)
            .env(env.iter().cloned());
        if exit_on_failure {
            task = task.exit_on_failure();
        }
        Ok(task)
    };

    let mut head = configure(command)?;
    for stage in pipes {
        let words = shell_words::split(&stage).map_err(|e| TaskError::InvalidPipe {
            command: stage.clone(),
            reason: format!("cannot split stage: {}", e),
        })?;
        head = head.pipe(configure(words)?);
    }
    Ok(head)
}
