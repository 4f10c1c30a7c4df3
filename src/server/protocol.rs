//! Text commands of the debugging channel.

use crate::debugger::breakpoint::BreakpointKind;
use crate::debugger::trap::ADDRESS_SPACE;
use crate::debugger::Error;
use crate::server::target::Control;
use chumsky::error::Rich;
use chumsky::prelude::{choice, end, just};
use chumsky::{extra, text, Boxed, Parser};

pub const ACTION_PREFIX: &str = "action/";
pub const REFRESH_COMMAND: &str = "refresh";
pub const STEP_COMMAND: &str = "step";
pub const STEP_OVER_COMMAND: &str = "step-over";
pub const CONTINUE_COMMAND: &str = "continue";
pub const STOP_COMMAND: &str = "stop";
pub const PAUSE_COMMAND: &str = "pause";
pub const SOFT_RESET_COMMAND: &str = "soft_reset";
pub const HARD_RESET_COMMAND: &str = "hard_reset";
pub const GET_MEMORY_COMMAND: &str = "get_memory";
pub const GET_MEMORY_FORCE_SUBCOMMAND: &str = "force_update";
pub const ADD_BREAKPOINT_COMMAND: &str = "add_breakpoint";
pub const REMOVE_BREAKPOINT_COMMAND: &str = "remove_breakpoint";
pub const PC_BREAKPOINT_TYPE: &str = "pc";
pub const MEMORY_BREAKPOINT_TYPE: &str = "mem";
pub const IO_BREAKPOINT_TYPE: &str = "io";

/// Decoded channel command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Push a fresh snapshot.
    Refresh,
    Control(Control),
    /// Send a memory segment, `force` bypasses the segment cache.
    GetMemory { start: u32, length: u32, force: bool },
    AddBreakpoint { kind: BreakpointKind, address: u16 },
    RemoveBreakpoint(usize),
}

type Err<'a> = extra::Err<Rich<'a, char>>;

/// Decimal number that must fit into `T`.
fn number<'a, T: TryFrom<u64>>(
    what: &'static str,
) -> impl Parser<'a, &'a str, T, Err<'a>> + Clone {
    text::digits(10)
        .at_least(1)
        .to_slice()
        .try_map(move |s: &str, span| {
            s.parse::<u64>()
                .ok()
                .and_then(|n| T::try_from(n).ok())
                .ok_or_else(|| Rich::custom(span, format!("{what} `{s}` is out of range")))
        })
        .labelled(what)
}

fn command<'a, I>(ctx: &'static str, inner: I) -> Boxed<'a, 'a, &'a str, Action, Err<'a>>
where
    I: Parser<'a, &'a str, Action, Err<'a>> + 'a,
{
    inner.then_ignore(end()).labelled(ctx).boxed()
}

impl Action {
    /// Parse channel message into action.
    pub fn parse(input: &str) -> Result<Action, Error> {
        Self::parser()
            .parse(input.trim())
            .into_result()
            .map_err(|e| Error::MalformedCommand(format!("`{}`: {}", input.trim(), e[0])))
    }

    fn parser<'a>() -> impl Parser<'a, &'a str, Action, Err<'a>> {
        let sep = || just('/');
        let control = |name: &'static str, control: Control| {
            command(name, just(name).to(Action::Control(control)))
        };

        let refresh = just(REFRESH_COMMAND).to(Action::Refresh);

        let get_memory = just(GET_MEMORY_COMMAND)
            .ignore_then(sep())
            .ignore_then(choice((
                just(GET_MEMORY_FORCE_SUBCOMMAND).to(Action::GetMemory {
                    start: 0,
                    length: ADDRESS_SPACE as u32,
                    force: true,
                }),
                number::<u32>("start")
                    .then_ignore(sep())
                    .then(number::<u32>("length"))
                    .map(|(start, length)| Action::GetMemory {
                        start,
                        length,
                        force: false,
                    }),
            )))
            .boxed();

        let breakpoint_kind = choice((
            just(PC_BREAKPOINT_TYPE).to(BreakpointKind::Pc),
            just(MEMORY_BREAKPOINT_TYPE).to(BreakpointKind::Memory),
            just(IO_BREAKPOINT_TYPE).to(BreakpointKind::Io),
        ))
        .labelled("breakpoint type");

        let add_breakpoint = just(ADD_BREAKPOINT_COMMAND)
            .ignore_then(sep())
            .ignore_then(breakpoint_kind)
            .then_ignore(sep())
            .then(number::<u16>("address"))
            .map(|(kind, address)| Action::AddBreakpoint { kind, address })
            .boxed();

        let remove_breakpoint = just(REMOVE_BREAKPOINT_COMMAND)
            .ignore_then(sep())
            .ignore_then(number::<usize>("breakpoint id"))
            .map(Action::RemoveBreakpoint)
            .boxed();

        just(ACTION_PREFIX)
            .ignore_then(choice((
                command(REFRESH_COMMAND, refresh),
                control(STEP_OVER_COMMAND, Control::StepOver),
                control(STEP_COMMAND, Control::Step),
                control(CONTINUE_COMMAND, Control::Continue),
                control(STOP_COMMAND, Control::Halt),
                control(PAUSE_COMMAND, Control::Pause),
                control(SOFT_RESET_COMMAND, Control::SoftReset),
                control(HARD_RESET_COMMAND, Control::HardReset),
                command(GET_MEMORY_COMMAND, get_memory),
                command(ADD_BREAKPOINT_COMMAND, add_breakpoint),
                command(REMOVE_BREAKPOINT_COMMAND, remove_breakpoint),
            )))
            .labelled("action")
    }
}

#[test]
fn test_number_parser() {
    struct TestCase {
        string: &'static str,
        result: Result<u16, ()>,
    }
    let cases = vec![
        TestCase {
            string: "100",
            result: Ok(100),
        },
        TestCase {
            string: "65535",
            result: Ok(65535),
        },
        TestCase {
            string: "65536",
            result: Err(()),
        },
        TestCase {
            string: "99999999999999999999999",
            result: Err(()),
        },
        TestCase {
            string: "0x10",
            result: Err(()),
        },
        TestCase {
            string: "",
            result: Err(()),
        },
    ];

    for tc in cases {
        let expr = number::<u16>("address")
            .then_ignore(end())
            .parse(tc.string)
            .into_result();
        assert_eq!(expr.map_err(|_| ()), tc.result, "input: {}", tc.string);
    }
}

#[test]
fn test_parser() {
    struct TestCase {
        inputs: Vec<&'static str>,
        action_matcher: fn(result: Result<Action, Error>),
    }
    let cases = vec![
        TestCase {
            inputs: vec!["action/refresh", "action/refresh\n", " action/refresh"],
            action_matcher: |result| assert_eq!(result.unwrap(), Action::Refresh),
        },
        TestCase {
            inputs: vec!["action/step"],
            action_matcher: |result| assert_eq!(result.unwrap(), Action::Control(Control::Step)),
        },
        TestCase {
            inputs: vec!["action/step-over"],
            action_matcher: |result| {
                assert_eq!(result.unwrap(), Action::Control(Control::StepOver))
            },
        },
        TestCase {
            inputs: vec!["action/continue"],
            action_matcher: |result| {
                assert_eq!(result.unwrap(), Action::Control(Control::Continue))
            },
        },
        TestCase {
            inputs: vec!["action/stop"],
            action_matcher: |result| assert_eq!(result.unwrap(), Action::Control(Control::Halt)),
        },
        TestCase {
            inputs: vec!["action/pause"],
            action_matcher: |result| assert_eq!(result.unwrap(), Action::Control(Control::Pause)),
        },
        TestCase {
            inputs: vec!["action/soft_reset"],
            action_matcher: |result| {
                assert_eq!(result.unwrap(), Action::Control(Control::SoftReset))
            },
        },
        TestCase {
            inputs: vec!["action/hard_reset"],
            action_matcher: |result| {
                assert_eq!(result.unwrap(), Action::Control(Control::HardReset))
            },
        },
        TestCase {
            inputs: vec!["action/get_memory/0/65536"],
            action_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Action::GetMemory {
                        start: 0,
                        length: 65536,
                        force: false
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["action/get_memory/force_update"],
            action_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Action::GetMemory {
                        start: 0,
                        length: 65536,
                        force: true
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["action/add_breakpoint/pc/100"],
            action_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Action::AddBreakpoint {
                        kind: BreakpointKind::Pc,
                        address: 100
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["action/add_breakpoint/mem/16384"],
            action_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Action::AddBreakpoint {
                        kind: BreakpointKind::Memory,
                        address: 0x4000
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["action/add_breakpoint/io/255"],
            action_matcher: |result| {
                assert_eq!(
                    result.unwrap(),
                    Action::AddBreakpoint {
                        kind: BreakpointKind::Io,
                        address: 255
                    }
                )
            },
        },
        TestCase {
            inputs: vec!["action/remove_breakpoint/0"],
            action_matcher: |result| assert_eq!(result.unwrap(), Action::RemoveBreakpoint(0)),
        },
        TestCase {
            inputs: vec![
                "action/add_breakpoint/pc/65536",
                "action/add_breakpoint/pc/-1",
                "action/add_breakpoint/pc/abc",
                "action/add_breakpoint/pc/",
                "action/add_breakpoint/data/100",
                "action/get_memory/0",
                "action/get_memory/a/b",
                "action/remove_breakpoint/",
                "action/remove_breakpoint/x",
            ],
            action_matcher: |result| assert!(matches!(result, Err(Error::MalformedCommand(_)))),
        },
        TestCase {
            inputs: vec![
                "",
                "refresh",
                "action/",
                "action/jump",
                "action/stepover",
                "action/step/1",
                "action/refresh/now",
            ],
            action_matcher: |result| assert!(matches!(result, Err(Error::MalformedCommand(_)))),
        },
    ];

    for case in cases {
        for input in case.inputs {
            (case.action_matcher)(Action::parse(input));
        }
    }
}
