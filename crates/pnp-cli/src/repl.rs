//! REPL – the interactive pick-and-place shell.
//!
//! Supported slash-commands:
//!   /help                              – show this list
//!   /state                             – orchestrator state
//!   /scene                             – dump a fresh scene snapshot as JSON
//!   /pose | /joints                    – current end-effector pose / joints
//!   /add <kind> <x> <y> <z> [r p y]    – add a catalogue object
//!   /attach <id> | /detach | /clean    – object lifecycle
//!   /home                              – move to the configured named target
//!   /goto <x> <y> <z> [r p y]          – cartesian goal in the base frame
//!   /above <id> [offset] [noflip]      – approach an object
//!   /place <id> [offset]               – move to a placement pose
//!   /lift <z>                          – straight vertical move to height z
//!   /ascend <h> | /descend <h>         – carry/grasp moves for height h
//!   /quit | /exit                      – leave the shell

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pnp_core::{MotionOrchestrator, MotionState, ShapeKind};
use pnp_geometry::Pose;
use pnp_geometry::engine::{GRASP_APPROACH_OFFSET, PLACE_APPROACH_OFFSET};
use pnp_types::{MotionError, MotionPlan, MoveGoal};
use tokio::runtime::Runtime;

/// Position plus roll/pitch/yaw, as typed by the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyzRpy {
    pub xyz: [f64; 3],
    pub rpy: [f64; 3],
}

impl XyzRpy {
    fn to_pose(self, frame: &str) -> Pose {
        let [x, y, z] = self.xyz;
        let [roll, pitch, yaw] = self.rpy;
        Pose::from_xyz_rpy(frame, x, y, z, roll, pitch, yaw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    State,
    Scene,
    Pose,
    Joints,
    Add { kind: ShapeKind, at: XyzRpy },
    Attach(String),
    Detach,
    Clean,
    Home,
    Goto(XyzRpy),
    Above { id: String, offset: f64, flip: bool },
    Place { id: String, offset: f64 },
    Lift(f64),
    Ascend(f64),
    Descend(f64),
    Quit,
}

/// Parse one input line.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let args: Vec<&str> = words.collect();

    let command = match head {
        "/help" => Command::Help,
        "/state" => Command::State,
        "/scene" => Command::Scene,
        "/pose" => Command::Pose,
        "/joints" => Command::Joints,
        "/detach" => Command::Detach,
        "/clean" => Command::Clean,
        "/home" => Command::Home,
        "/quit" | "/exit" => Command::Quit,
        "/add" => {
            let (kind, rest) = args
                .split_first()
                .ok_or("usage: /add <kind> <x> <y> <z> [roll pitch yaw]")?;
            Command::Add {
                kind: kind.parse()?,
                at: parse_xyz_rpy(rest)?,
            }
        }
        "/attach" => match args.as_slice() {
            [id] => Command::Attach(id.to_string()),
            _ => return Err("usage: /attach <id>".to_string()),
        },
        "/goto" => Command::Goto(parse_xyz_rpy(&args)?),
        "/above" => match args.as_slice() {
            [id, rest @ ..] if rest.len() <= 2 => {
                let mut offset = GRASP_APPROACH_OFFSET;
                let mut flip = true;
                for arg in rest {
                    if *arg == "noflip" {
                        flip = false;
                    } else {
                        offset = parse_number(arg)?;
                    }
                }
                Command::Above {
                    id: id.to_string(),
                    offset,
                    flip,
                }
            }
            _ => return Err("usage: /above <id> [offset] [noflip]".to_string()),
        },
        "/place" => match args.as_slice() {
            [id] => Command::Place {
                id: id.to_string(),
                offset: PLACE_APPROACH_OFFSET,
            },
            [id, offset] => Command::Place {
                id: id.to_string(),
                offset: parse_number(offset)?,
            },
            _ => return Err("usage: /place <id> [offset]".to_string()),
        },
        "/lift" => Command::Lift(single_number(&args, "usage: /lift <z>")?),
        "/ascend" => Command::Ascend(single_number(&args, "usage: /ascend <height>")?),
        "/descend" => Command::Descend(single_number(&args, "usage: /descend <height>")?),
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(command)
}

fn parse_number(raw: &str) -> Result<f64, String> {
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("'{raw}' is not a number")),
    }
}

fn single_number(args: &[&str], usage: &str) -> Result<f64, String> {
    match args {
        [value] => parse_number(value),
        _ => Err(usage.to_string()),
    }
}

fn parse_xyz_rpy(args: &[&str]) -> Result<XyzRpy, String> {
    if args.len() != 3 && args.len() != 6 {
        return Err("expected <x> <y> <z> [roll pitch yaw]".to_string());
    }
    let values = args
        .iter()
        .map(|a| parse_number(a))
        .collect::<Result<Vec<_>, _>>()?;
    let rpy = match values.get(3..6) {
        Some(&[roll, pitch, yaw]) => [roll, pitch, yaw],
        _ => [0.0; 3],
    };
    Ok(XyzRpy {
        xyz: [values[0], values[1], values[2]],
        rpy,
    })
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(orchestrator: Arc<MotionOrchestrator>, runtime: &Runtime, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "pnp>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        match parse(&line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(command) => runtime.block_on(dispatch(&orchestrator, command)),
            Err(e) => println!(
                "{} {}. Type {} for available commands.",
                "Error:".red(),
                e.yellow(),
                "/help".bold()
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn dispatch(orchestrator: &MotionOrchestrator, command: Command) {
    let frame = orchestrator.config().base_frame.clone();
    match command {
        Command::Help => cmd_help(),
        Command::State => print_state(&orchestrator.state()),
        Command::Scene => match orchestrator.scene().refresh().await {
            Ok(snapshot) => match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => println!("{json}"),
                Err(e) => println!("{}: {}", "Serialization error".red(), e),
            },
            Err(e) => report_error(&e),
        },
        Command::Pose => match orchestrator.current_pose().await {
            Ok(pose) => println!("  {}", pose.to_string().bold()),
            Err(e) => report_error(&e),
        },
        Command::Joints => match orchestrator.current_joints().await {
            Ok(joints) => {
                for (name, value) in joints.iter() {
                    println!("  {:<12} {:>9.4}", name.bold(), value);
                }
            }
            Err(e) => report_error(&e),
        },
        Command::Add { kind, at } => {
            match orchestrator.objects().add(kind, at.to_pose(&frame)).await {
                Ok(object) => println!("{} added {}", "✓".green().bold(), object.id.bold()),
                Err(e) => report_error(&e),
            }
        }
        Command::Attach(id) => match orchestrator.objects().attach(&id).await {
            Ok(attached) => println!(
                "{} {} attached to {}",
                "✓".green().bold(),
                attached.object.id.bold(),
                attached.link_name.bold()
            ),
            Err(e) => report_error(&e),
        },
        Command::Detach => match orchestrator.objects().detach().await {
            Ok(object) => println!(
                "{} {} released at {}",
                "✓".green().bold(),
                object.id.bold(),
                object.pose
            ),
            Err(e) => report_error(&e),
        },
        Command::Clean => match orchestrator.objects().clean().await {
            Ok(removed) => println!("{} removed {} object(s)", "✓".green().bold(), removed),
            Err(e) => report_error(&e),
        },
        Command::Home => report_motion(orchestrator.move_home().await),
        Command::Goto(at) => {
            report_motion(orchestrator.submit(MoveGoal::Cartesian(at.to_pose(&frame))).await)
        }
        Command::Above { id, offset, flip } => {
            report_motion(orchestrator.move_above(&id, offset, flip).await)
        }
        Command::Place { id, offset } => {
            report_motion(orchestrator.move_to_place(&id, offset).await)
        }
        Command::Lift(z) => report_motion(orchestrator.vertical_move(z).await),
        Command::Ascend(h) => report_motion(orchestrator.ascend(h).await),
        Command::Descend(h) => report_motion(orchestrator.descend(h).await),
        Command::Quit => {}
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Pick-and-place Commands".bold().underline());
    println!("  {}                      – orchestrator state", "/state".bold().cyan());
    println!("  {}                      – fresh scene snapshot (JSON)", "/scene".bold().cyan());
    println!("  {}             – end-effector pose / joint values", "/pose  /joints".bold().cyan());
    println!("  {}  – add cylinder, box, epingle or plaque", "/add <kind> x y z [r p y]".bold().cyan());
    println!("  {}    – attach, detach, remove all", "/attach <id>  /detach  /clean".bold().cyan());
    println!("  {}                       – move to the home target", "/home".bold().cyan());
    println!("  {}        – cartesian goal", "/goto x y z [r p y]".bold().cyan());
    println!("  {}  – approach an object", "/above <id> [offset] [noflip]".bold().cyan());
    println!("  {}         – placement pose", "/place <id> [offset]".bold().cyan());
    println!("  {}                    – vertical move to height z", "/lift <z>".bold().cyan());
    println!("  {}  – carry / grasp heights", "/ascend <h>  /descend <h>".bold().cyan());
    println!("  {}                – exit the shell", "/quit  /exit".bold().cyan());
    println!("  {}", "Ctrl-C halts a running motion.".dimmed());
    println!();
}

fn print_state(state: &MotionState) {
    let label = state.to_string();
    let colored = match state {
        MotionState::Succeeded => label.green(),
        MotionState::Failed(_) => label.red(),
        MotionState::Idle => label.normal(),
        MotionState::Planning | MotionState::Executing => label.yellow(),
    };
    println!("  State: {}", colored.bold());
}

fn report_motion(result: Result<MotionPlan, MotionError>) {
    match result {
        Ok(plan) => println!(
            "{} motion done: {} point(s) over {:.2}s",
            "✓".green().bold(),
            plan.len(),
            plan.duration().as_secs_f64()
        ),
        Err(MotionError::Cancelled) => println!("{}", "⚠  Motion cancelled.".yellow().bold()),
        Err(e) => report_error(&e),
    }
}

fn report_error(e: &dyn std::fmt::Display) {
    println!("{} {}", "✗".red().bold(), e.to_string().red());
}
