use std::io::BufRead;

use tokio::sync::mpsc;

use crate::core::time::format_clock;
use crate::proctoring::environment::{InterceptedInput, KeyChord};
use crate::proctoring::{
    ExamSession, Route, SessionSnapshot, SessionStatus, SimulatedEnvironment, UiUpdate,
};
use crate::tasks::session_runner::UserCommand;

pub(crate) const HELP: &str = "commands: fullscreen | exit-fullscreen | hide | show | copy | paste | cut \
| contextmenu | key <ctrl|cmd>+<k> | answer <question> <option> | status | submit | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConsoleCommand {
    Session(UserCommand),
    ExitFullscreen,
    Hide,
    Show,
    Intercept(InterceptedInput),
    Key(KeyChord),
    Help,
}

/// Parses one stdin line. Question numbers are 1-based on the console.
pub(crate) fn parse_line(line: &str) -> Result<ConsoleCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".to_string());
    };

    let command = match head.to_ascii_lowercase().as_str() {
        "fullscreen" => ConsoleCommand::Session(UserCommand::EnterFullscreen),
        "exit-fullscreen" => ConsoleCommand::ExitFullscreen,
        "hide" => ConsoleCommand::Hide,
        "show" => ConsoleCommand::Show,
        "copy" => ConsoleCommand::Intercept(InterceptedInput::Copy),
        "paste" => ConsoleCommand::Intercept(InterceptedInput::Paste),
        "cut" => ConsoleCommand::Intercept(InterceptedInput::Cut),
        "contextmenu" => ConsoleCommand::Intercept(InterceptedInput::ContextMenu),
        "key" => ConsoleCommand::Key(parse_chord(parts.next().unwrap_or_default())?),
        "answer" => {
            let question = parts
                .next()
                .and_then(|raw| raw.parse::<usize>().ok())
                .filter(|number| *number > 0)
                .ok_or_else(|| "usage: answer <question> <option>".to_string())?;
            let option = parts.collect::<Vec<_>>().join(" ");
            if option.is_empty() {
                return Err("usage: answer <question> <option>".to_string());
            }
            ConsoleCommand::Session(UserCommand::SelectAnswer { index: question - 1, option })
        }
        "status" => ConsoleCommand::Session(UserCommand::Status),
        "submit" => ConsoleCommand::Session(UserCommand::Submit),
        "quit" | "exit" => ConsoleCommand::Session(UserCommand::Quit),
        "help" | "?" => ConsoleCommand::Help,
        other => return Err(format!("unknown command '{other}'")),
    };

    Ok(command)
}

fn parse_chord(raw: &str) -> Result<KeyChord, String> {
    let usage = || "usage: key <ctrl|cmd>+<k>".to_string();
    let (modifier, key) = raw.split_once('+').ok_or_else(usage)?;
    let mut chars = key.chars();
    let (Some(key), None) = (chars.next(), chars.next()) else {
        return Err(usage());
    };

    match modifier.to_ascii_lowercase().as_str() {
        "ctrl" => Ok(KeyChord::ctrl(key)),
        "cmd" | "meta" => Ok(KeyChord::cmd(key)),
        _ => Err(usage()),
    }
}

/// Reads stdin on a dedicated thread; a blocked read must not hold up
/// runtime shutdown.
pub(crate) fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

/// Routes console lines to the simulated environment or the session.
/// Returns when stdin closes or the session stops accepting commands.
pub(crate) async fn drive_input(
    mut lines: mpsc::UnboundedReceiver<String>,
    env: SimulatedEnvironment,
    commands: mpsc::Sender<UserCommand>,
) {
    while let Some(line) = lines.recv().await {
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            ConsoleCommand::Session(command) => {
                if commands.send(command).await.is_err() {
                    break;
                }
            }
            ConsoleCommand::ExitFullscreen => env.user_exit_fullscreen(),
            ConsoleCommand::Hide => env.hide_page(),
            ConsoleCommand::Show => env.show_page(),
            ConsoleCommand::Intercept(input) => {
                env.trigger(input);
            }
            ConsoleCommand::Key(chord) => {
                if !env.press(chord) {
                    tracing::debug!(?chord, "Key press not intercepted");
                }
            }
            ConsoleCommand::Help => println!("{HELP}"),
        }
    }
}

pub(crate) async fn render(mut updates: mpsc::UnboundedReceiver<UiUpdate>) {
    while let Some(update) = updates.recv().await {
        if let Some(line) = render_update(&update) {
            println!("{line}");
        }
    }
}

pub(crate) fn render_update(update: &UiUpdate) -> Option<String> {
    let line = match update {
        UiUpdate::StatusChanged(status) => match status {
            SessionStatus::AwaitingFullscreen => "[exam hidden until fullscreen]".to_string(),
            SessionStatus::Active => "[exam in progress]".to_string(),
            SessionStatus::AutoSubmitPending | SessionStatus::ManualSubmitPending => {
                "[submitting...]".to_string()
            }
            SessionStatus::Terminated => "[session closed]".to_string(),
            SessionStatus::ViewOnly => "[preview mode: submission disabled]".to_string(),
        },
        UiUpdate::FullscreenPrompt { retry_message } => match retry_message {
            Some(message) => format!("{message} Type 'fullscreen' to continue."),
            None => "This exam must be taken in fullscreen mode. Type 'fullscreen' to begin."
                .to_string(),
        },
        UiUpdate::Blocking(message) => format!("!! {message}"),
        UiUpdate::Clock { remaining_seconds, low_time } => {
            if *low_time && *remaining_seconds > 0 {
                format!(
                    "{} Only {remaining_seconds} seconds remaining! Submit your exam now!",
                    format_clock(*remaining_seconds)
                )
            } else if remaining_seconds % 60 == 0 {
                format!("Time remaining: {}", format_clock(*remaining_seconds))
            } else {
                return None;
            }
        }
        UiUpdate::LowTimeWarning(message) => format!("! {message}"),
        UiUpdate::NoticeShown(notice) => format!("! {}", notice.text),
        UiUpdate::NoticeDismissed(_) => return None,
        UiUpdate::Summary(snapshot) => render_summary(snapshot),
        UiUpdate::GraceCountdown { title, message, seconds_left } => {
            format!("{title} {message} Submitting in {seconds_left}s")
        }
        UiUpdate::AnswerRecorded { index, option } => {
            format!("Question {} answered: {option}", index + 1)
        }
        UiUpdate::AnswerRejected(message) => format!("Answer not recorded: {message}"),
        UiUpdate::SubmissionConfirmed(message) => message.clone(),
        UiUpdate::SubmissionFailed { message, relogin } => {
            if *relogin {
                format!("!! {message}")
            } else {
                format!("!! {message} (submission was not retried)")
            }
        }
        UiUpdate::Navigate(route) => format!("-> {}", route_path(*route)),
    };
    Some(line)
}

fn render_summary(snapshot: &SessionSnapshot) -> String {
    let mut line = format!(
        "[{}] {} left, {}/{} answered",
        snapshot.status.as_str(),
        format_clock(snapshot.remaining_seconds),
        snapshot.answered,
        snapshot.question_count
    );
    if snapshot.status != SessionStatus::ViewOnly {
        line.push_str(&format!(", {}", tab_switch_banner(snapshot.tab_switches_remaining)));
    }
    if let Some(seconds) = snapshot.grace_seconds_left {
        line.push_str(&format!(", submitting in {seconds}s"));
    }
    if !snapshot.timer_running && snapshot.status == SessionStatus::AwaitingFullscreen {
        line.push_str(", clock paused");
    }
    line
}

fn tab_switch_banner(remaining: u32) -> String {
    match remaining {
        1 => "1 tab switch remaining".to_string(),
        n => format!("{n} tab switches remaining"),
    }
}

pub(crate) fn route_path(route: Route) -> &'static str {
    match route {
        Route::Results => "/results",
        Route::Login => "/login",
    }
}

pub(crate) fn print_exam(exam: &ExamSession, snapshot: &SessionSnapshot) {
    println!("{}", exam.title());
    println!("Time limit: {}", format_clock(exam.time_limit_seconds()));
    if snapshot.status != SessionStatus::ViewOnly {
        println!(
            "Copy-paste, right-click, and tab switching are disabled. You have {}.",
            tab_switch_banner(snapshot.tab_switches_remaining)
        );
    }
    for (index, question) in exam.questions().iter().enumerate() {
        println!("{}. {}", index + 1, question.prompt);
        for option in &question.options {
            println!("   - {option}");
        }
    }
    println!("{HELP}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_and_environment_commands() {
        assert_eq!(
            parse_line("fullscreen"),
            Ok(ConsoleCommand::Session(UserCommand::EnterFullscreen))
        );
        assert_eq!(parse_line("  HIDE "), Ok(ConsoleCommand::Hide));
        assert_eq!(
            parse_line("contextmenu"),
            Ok(ConsoleCommand::Intercept(InterceptedInput::ContextMenu))
        );
        assert_eq!(parse_line("quit"), Ok(ConsoleCommand::Session(UserCommand::Quit)));
    }

    #[test]
    fn answer_uses_one_based_question_and_keeps_spaces_in_option() {
        assert_eq!(
            parse_line("answer 2 New York"),
            Ok(ConsoleCommand::Session(UserCommand::SelectAnswer {
                index: 1,
                option: "New York".to_string()
            }))
        );
        assert!(parse_line("answer 0 A").is_err());
        assert!(parse_line("answer two A").is_err());
        assert!(parse_line("answer 1").is_err());
    }

    #[test]
    fn key_chords_require_modifier_and_single_key() {
        assert_eq!(parse_line("key ctrl+c"), Ok(ConsoleCommand::Key(KeyChord::ctrl('c'))));
        assert_eq!(parse_line("key cmd+v"), Ok(ConsoleCommand::Key(KeyChord::cmd('v'))));
        assert!(parse_line("key c").is_err());
        assert!(parse_line("key alt+c").is_err());
        assert!(parse_line("key ctrl+cv").is_err());
        assert!(parse_line("key").is_err());
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(parse_line("dance"), Err("unknown command 'dance'".to_string()));
    }

    #[test]
    fn clock_renders_banner_only_when_low() {
        assert_eq!(
            render_update(&UiUpdate::Clock { remaining_seconds: 12, low_time: true }),
            Some("00:12 Only 12 seconds remaining! Submit your exam now!".to_string())
        );
        assert_eq!(
            render_update(&UiUpdate::Clock { remaining_seconds: 120, low_time: false }),
            Some("Time remaining: 02:00".to_string())
        );
        assert_eq!(render_update(&UiUpdate::Clock { remaining_seconds: 95, low_time: false }), None);
    }

    #[test]
    fn status_command_parses_and_summary_shows_remaining_tab_switches() {
        assert_eq!(parse_line("status"), Ok(ConsoleCommand::Session(UserCommand::Status)));

        let snapshot = SessionSnapshot {
            status: SessionStatus::AwaitingFullscreen,
            remaining_seconds: 534,
            timer_running: false,
            tab_switches_remaining: 1,
            answered: 2,
            question_count: 3,
            grace_seconds_left: None,
            submit_enabled: false,
        };
        assert_eq!(
            render_update(&UiUpdate::Summary(snapshot.clone())),
            Some(
                "[awaiting_fullscreen] 08:54 left, 2/3 answered, 1 tab switch remaining, clock paused"
                    .to_string()
            )
        );

        let pending = SessionSnapshot {
            status: SessionStatus::AutoSubmitPending,
            tab_switches_remaining: 0,
            grace_seconds_left: Some(7),
            ..snapshot
        };
        assert_eq!(
            render_update(&UiUpdate::Summary(pending)),
            Some(
                "[auto_submit_pending] 08:54 left, 2/3 answered, 0 tab switches remaining, submitting in 7s"
                    .to_string()
            )
        );
    }

    #[test]
    fn navigation_renders_route_path() {
        assert_eq!(render_update(&UiUpdate::Navigate(Route::Login)), Some("-> /login".to_string()));
    }
}
