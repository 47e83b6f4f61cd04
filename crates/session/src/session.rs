//! The IDE-facing debug session.

use std::collections::VecDeque;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use dap_codec::events::{
    BreakpointEventBody, BreakpointEventReason, EventBody, OutputEventBody, StoppedEventBody,
    StoppedReason,
};
use dap_codec::requests::{
    DisconnectArguments, InitializeArguments, ScopesArguments, SetBreakpointsArguments,
    SetFunctionBreakpointsArguments, StackTraceArguments, ThreadArguments, VariablesArguments,
};
use dap_codec::responses::{
    Capabilities, ContinueResponse, ResponseBody, ScopesResponse, SetBreakpointsResponse,
    SetFunctionBreakpointsResponse, StackTraceResponse, ThreadsResponse, VariablesResponse,
};
use dap_codec::types::{self, Scope, Source, StackFrame, Thread, Variable};
use dap_codec::{OutgoingEvent, OutgoingMessage, OutgoingResponse, Request, Seq};
use futures::{Stream, StreamExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use transport::commands::{
    self, BreakpointConfirmation, ListVariables, SetBreakpoint, SetFunctionBreakpoint,
};
use transport::{
    CommandError, Commander, Connection, ConnectionEvent, Connector, EventSource, ResponseFrame,
    TcpConnector, TransportError,
};

use crate::config::{AttachArguments, SessionConfig};
use crate::error::SessionError;
use crate::logging::{NoTrace, TraceSink};
use crate::machine::{
    BreakpointRecord, BreakpointTarget, DebuggerMachine, MachineEvent, SessionState,
};

/// The remote debugger is single threaded.
pub const THREAD_ID: types::ThreadId = 1;

/// Upper bound on a graceful disconnect.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The only variables reference handed out: the flat list of locals.
const LOCALS_REFERENCE: types::VariablesReference = 1;

type RequestResult = Result<Option<ResponseBody>, SessionError>;

/// A command that lets the debuggee run until the next prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Continue,
    Step,
    Restart,
}

impl Resume {
    fn stop_reason(self) -> StoppedReason {
        match self {
            Resume::Continue => StoppedReason::Breakpoint,
            Resume::Step => StoppedReason::Step,
            Resume::Restart => StoppedReason::Entry,
        }
    }
}

struct InFlight {
    kind: Resume,
    handle: JoinHandle<Result<String, CommandError>>,
}

/// One iteration of the session loop.
enum Wakeup {
    Request(Option<Request>),
    Connection(Option<ConnectionEvent>),
    Resumed(Resume, Result<String, CommandError>),
}

/// IDE requests, plus those that arrived while an earlier one was handled.
struct Inbox<S> {
    stream: S,
    backlog: VecDeque<Request>,
    closed: bool,
}

impl<S> Inbox<S>
where
    S: Stream<Item = Request> + Unpin,
{
    fn new(stream: S) -> Self {
        Self {
            stream,
            backlog: VecDeque::new(),
            closed: false,
        }
    }

    /// Read the stream. Never resolves once it has ended.
    async fn receive(&mut self) -> Option<Request> {
        if self.closed {
            return pending().await;
        }
        let request = self.stream.next().await;
        self.closed = request.is_none();
        request
    }
}

/// Bridges one IDE client to one remote debugger.
///
/// Requests are handled one at a time, in arrival order. Responses and
/// events are written to the outbox in the order the IDE must see them.
pub struct DebugSession<C = TcpConnector> {
    connector: C,
    trace: Arc<dyn TraceSink>,
    rng: StdRng,
    machine: DebuggerMachine,
    config: Option<SessionConfig>,
    connection: Option<Connection>,
    events: Option<EventSource>,
    in_flight: Option<InFlight>,
    outbox: mpsc::UnboundedSender<OutgoingMessage>,
    /// Events to send once the current response is out.
    followups: Vec<EventBody>,
    seq: Seq,
}

impl DebugSession<TcpConnector> {
    pub fn new(outbox: mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self::with_connector(TcpConnector, outbox)
    }
}

impl<C: Connector> DebugSession<C> {
    pub fn with_connector(connector: C, outbox: mpsc::UnboundedSender<OutgoingMessage>) -> Self {
        Self {
            connector,
            trace: Arc::new(NoTrace),
            rng: StdRng::from_entropy(),
            machine: DebuggerMachine::new(),
            config: None,
            connection: None,
            events: None,
            in_flight: None,
            outbox,
            followups: Vec::new(),
            seq: 0,
        }
    }

    pub fn with_trace_sink(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    /// Use `rng` to pick default ports.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    /// Serve requests until the IDE goes away or disconnects.
    pub async fn run<S>(mut self, requests: S)
    where
        S: Stream<Item = Request> + Unpin,
    {
        let mut inbox = Inbox::new(requests);

        loop {
            let wakeup = match inbox.backlog.pop_front() {
                Some(request) => Wakeup::Request(Some(request)),
                None if inbox.closed => Wakeup::Request(None),
                None => tokio::select! {
                    request = inbox.receive() => Wakeup::Request(request),
                    event = next_event(&mut self.events) => Wakeup::Connection(event),
                    (kind, result) = resume_outcome(&mut self.in_flight) => Wakeup::Resumed(kind, result),
                },
            };

            match wakeup {
                Wakeup::Request(Some(request)) => {
                    let disconnect = if request.command == "disconnect" {
                        request
                    } else {
                        match self.handle_interruptible(request, &mut inbox).await {
                            Some(disconnect) => disconnect,
                            None => continue,
                        }
                    };
                    self.handle_request(disconnect).await;
                    if self.state() == SessionState::Terminated {
                        break;
                    }
                }
                Wakeup::Request(None) => {
                    tracing::debug!("client closed the request stream");
                    break;
                }
                Wakeup::Connection(Some(event)) => self.handle_connection_event(event),
                Wakeup::Connection(None) => self.events = None,
                Wakeup::Resumed(kind, result) => {
                    self.in_flight = None;
                    self.finish_resume(kind, result);
                }
            }
        }

        self.shutdown();
    }

    /// Handle `request` while still reading the inbox.
    ///
    /// Requests arriving meanwhile are queued, except `disconnect`: it
    /// abandons the handler, so a remote that never answers cannot hold the
    /// session. The abandoned request fails with `ConnectionLost` and the
    /// queued ones are refused. Returns the `disconnect` to run next.
    async fn handle_interruptible<S>(
        &mut self,
        request: Request,
        inbox: &mut Inbox<S>,
    ) -> Option<Request>
    where
        S: Stream<Item = Request> + Unpin,
    {
        let interrupted = request.clone();
        let disconnect = {
            let handler = self.handle_request(request);
            tokio::pin!(handler);
            loop {
                tokio::select! {
                    biased;
                    () = &mut handler => return None,
                    next = inbox.receive() => match next {
                        Some(next) if next.command == "disconnect" => break next,
                        Some(next) => inbox.backlog.push_back(next),
                        None => {}
                    },
                }
            }
        };

        tracing::info!(
            seq = interrupted.seq,
            command = %interrupted.command,
            "request interrupted by disconnect"
        );
        self.followups.clear();
        self.reply(&interrupted, Err(TransportError::ConnectionLost.into()));
        for queued in std::mem::take(&mut inbox.backlog) {
            self.reply(&queued, Err(SessionError::protocol("the session is disconnecting")));
        }
        Some(disconnect)
    }

    /// Handle one request and write its response, followed by any events it
    /// produced.
    #[tracing::instrument(skip(self, request), fields(seq = request.seq, command = %request.command))]
    pub async fn handle_request(&mut self, request: Request) {
        let result = self.dispatch(&request).await;
        self.reply(&request, result);

        for body in std::mem::take(&mut self.followups) {
            self.emit(body);
        }
    }

    fn reply(&mut self, request: &Request, result: RequestResult) {
        let response = match result {
            Ok(body) => OutgoingResponse::success(self.next_seq(), request, body),
            Err(e) => {
                tracing::warn!(error = %e, "request failed");
                OutgoingResponse::error(self.next_seq(), request, e.to_error_message())
            }
        };
        self.send(OutgoingMessage::Response(response));
    }

    async fn dispatch(&mut self, request: &Request) -> RequestResult {
        match request.command.as_str() {
            "initialize" => self.initialize(arguments(request)?),
            "launch" => Err(SessionError::protocol("launch is not supported, use attach")),
            "attach" => self.attach(arguments(request)?).await,
            "setBreakpoints" => self.set_breakpoints(arguments(request)?).await,
            "setFunctionBreakpoints" => self.set_function_breakpoints(arguments(request)?).await,
            "configurationDone" => Ok(None),
            "threads" => Ok(Some(ResponseBody::Threads(ThreadsResponse {
                threads: vec![Thread {
                    id: THREAD_ID,
                    name: format!("thread {THREAD_ID}"),
                }],
            }))),
            "continue" => self.resume(Resume::Continue, arguments(request)?),
            "next" | "stepIn" => self.resume(Resume::Step, arguments(request)?),
            "restart" => self.resume(Resume::Restart, ThreadArguments::default()),
            "stackTrace" => self.stack_trace(arguments(request)?).await,
            "scopes" => scopes(arguments(request)?),
            "variables" => self.variables(arguments(request)?).await,
            "disconnect" => self.disconnect(arguments(request)?).await,
            other => Err(SessionError::protocol(format!("unsupported request `{other}`"))),
        }
    }

    fn initialize(&mut self, args: InitializeArguments) -> RequestResult {
        self.machine.fire(MachineEvent::Initialize)?;
        tracing::info!(
            client = args.client_name.as_deref().unwrap_or("unknown"),
            adapter_id = ?args.adapter_id,
            "initializing"
        );
        Ok(Some(ResponseBody::Initialize(Capabilities {
            supports_configuration_done_request: Some(true),
            supports_function_breakpoints: Some(true),
            supports_conditional_breakpoints: Some(false),
            supports_evaluate_for_hovers: Some(false),
            supports_step_back: Some(false),
            supports_restart_request: Some(true),
            supports_terminate_request: Some(false),
        })))
    }

    async fn attach(&mut self, args: AttachArguments) -> RequestResult {
        self.machine.fire(MachineEvent::Attach)?;
        let config = SessionConfig::resolve(args, &mut self.rng);
        self.trace.set_trace(config.trace);
        tracing::info!(address = %config.address, "attaching to remote debugger");

        let (connection, banner, events) = match connect(&self.connector, &config).await {
            Ok(connected) => connected,
            Err(e) => {
                self.machine.fire(MachineEvent::ConnectFailed)?;
                self.followups.push(EventBody::Terminated);
                return Err(e.into());
            }
        };
        self.machine.fire(MachineEvent::Ready)?;
        self.config = Some(config);

        let banner_text = banner.body();
        if !banner_text.trim().is_empty() {
            self.followups
                .push(EventBody::Output(OutputEventBody::console(banner_text.into_owned())));
        }
        self.followups.push(EventBody::Initialized);

        let commander = connection.commander().clone();
        self.connection = Some(connection);
        self.events = Some(events);
        self.replay_breakpoints(&commander).await;

        self.followups.push(stopped(StoppedReason::Entry));
        Ok(None)
    }

    /// Apply breakpoints recorded before the connection existed.
    async fn replay_breakpoints(&mut self, commander: &Commander) {
        let pending: Vec<BreakpointRecord> = self.machine.context().breakpoints().to_vec();
        for record in pending {
            match self.apply_breakpoint(commander, &record).await {
                Ok(Some(confirmed)) => {
                    let breakpoint = dap_breakpoint(&confirmed);
                    self.followups.push(EventBody::Breakpoint(BreakpointEventBody {
                        reason: BreakpointEventReason::Changed,
                        breakpoint,
                    }));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(breakpoint = %record.target, error = %e, "could not apply breakpoint"),
            }
        }
    }

    /// Send one breakpoint to the remote. Returns the updated record when the
    /// remote confirmed it.
    async fn apply_breakpoint(
        &mut self,
        commander: &Commander,
        record: &BreakpointRecord,
    ) -> Result<Option<BreakpointRecord>, CommandError> {
        let confirmation: Option<BreakpointConfirmation> = match &record.target {
            BreakpointTarget::Line { file, line } => {
                let command = SetBreakpoint {
                    file: file.clone(),
                    line: *line,
                };
                commander.execute(&command).await?
            }
            BreakpointTarget::Function { name } => {
                let command = SetFunctionBreakpoint { name: name.clone() };
                commander.execute(&command).await?
            }
        };

        let Some(confirmation) = confirmation else {
            return Ok(None);
        };
        Ok(self
            .machine
            .context_mut()
            .confirm(record.id, confirmation.line)
            .cloned())
    }

    /// The commander, if a paused connection exists. Errors while running.
    fn paused_commander(&self) -> Result<Option<Commander>, SessionError> {
        match self.state() {
            SessionState::Running => Err(SessionError::protocol(
                "the debuggee is running; wait for it to stop",
            )),
            state if state.is_paused() => Ok(self.connection.as_ref().map(|c| c.commander().clone())),
            _ => Ok(None),
        }
    }

    async fn set_breakpoints(&mut self, args: SetBreakpointsArguments) -> RequestResult {
        let file = args
            .source
            .path
            .clone()
            .or_else(|| args.source.name.clone())
            .ok_or_else(|| SessionError::protocol("breakpoint source has no path"))?;
        let commander = self.paused_commander()?;

        let records = self
            .machine
            .context_mut()
            .replace_source_breakpoints(&file, &args.requested_lines());
        let breakpoints = self.apply_all(commander.as_ref(), records).await?;
        Ok(Some(ResponseBody::SetBreakpoints(SetBreakpointsResponse {
            breakpoints,
        })))
    }

    async fn set_function_breakpoints(&mut self, args: SetFunctionBreakpointsArguments) -> RequestResult {
        let commander = self.paused_commander()?;
        let names: Vec<String> = args.breakpoints.into_iter().map(|bp| bp.name).collect();

        let records = self
            .machine
            .context_mut()
            .replace_function_breakpoints(&names);
        let breakpoints = self.apply_all(commander.as_ref(), records).await?;
        Ok(Some(ResponseBody::SetFunctionBreakpoints(
            SetFunctionBreakpointsResponse { breakpoints },
        )))
    }

    /// Apply breakpoints one after another, reporting them in input order.
    ///
    /// A rejected or undecodable breakpoint is reported unverified; losing
    /// the connection fails the whole request.
    async fn apply_all(
        &mut self,
        commander: Option<&Commander>,
        records: Vec<BreakpointRecord>,
    ) -> Result<Vec<types::Breakpoint>, SessionError> {
        let mut breakpoints = Vec::with_capacity(records.len());
        for record in records {
            let Some(commander) = commander else {
                let mut breakpoint = dap_breakpoint(&record);
                breakpoint.message = Some("not connected to the remote debugger yet".to_string());
                breakpoints.push(breakpoint);
                continue;
            };

            let breakpoint = match self.apply_breakpoint(commander, &record).await {
                Ok(Some(confirmed)) => dap_breakpoint(&confirmed),
                Ok(None) => {
                    let mut breakpoint = dap_breakpoint(&record);
                    breakpoint.message = Some("rejected by the remote debugger".to_string());
                    breakpoint
                }
                Err(CommandError::Decode(e)) => {
                    tracing::warn!(error = %e, "could not decode breakpoint response");
                    let mut breakpoint = dap_breakpoint(&record);
                    breakpoint.message = Some(e.to_string());
                    breakpoint
                }
                Err(CommandError::Transport(e)) => return Err(e.into()),
            };
            breakpoints.push(breakpoint);
        }
        Ok(breakpoints)
    }

    fn resume(&mut self, kind: Resume, args: ThreadArguments) -> RequestResult {
        if let Some(thread_id) = args.thread_id.filter(|&id| id != THREAD_ID) {
            tracing::debug!(thread_id, "unknown thread, resuming the only one");
        }
        let commander = self
            .paused_commander()?
            .ok_or_else(|| SessionError::protocol("not attached to a remote debugger"))?;
        self.machine.fire(MachineEvent::Resume)?;

        let handle = tokio::spawn(async move {
            match kind {
                Resume::Continue => commander.execute(&commands::Continue).await,
                Resume::Step => commander.execute(&commands::Step).await,
                Resume::Restart => commander.execute(&commands::Restart).await,
            }
        });
        self.in_flight = Some(InFlight { kind, handle });

        Ok(match kind {
            Resume::Continue => Some(ResponseBody::Continue(ContinueResponse {
                all_threads_continued: Some(true),
            })),
            Resume::Step | Resume::Restart => None,
        })
    }

    fn finish_resume(&mut self, kind: Resume, result: Result<String, CommandError>) {
        match result {
            Ok(output) => {
                if !output.trim().is_empty() {
                    self.emit(EventBody::Output(OutputEventBody::console(output)));
                }
                if let Err(e) = self.machine.fire(MachineEvent::Paused) {
                    tracing::debug!(error = %e, "resume completed after the session moved on");
                    return;
                }
                self.emit(stopped(kind.stop_reason()));
            }
            Err(CommandError::Transport(TransportError::ConnectionLost)) => {
                // the Closed event ends the session
                tracing::debug!(?kind, "connection lost while running");
            }
            Err(e) => {
                tracing::warn!(?kind, error = %e, "resume command failed");
                self.emit(EventBody::Output(OutputEventBody::console(format!("{e}\n"))));
            }
        }
    }

    async fn stack_trace(&mut self, args: StackTraceArguments) -> RequestResult {
        let commander = self
            .paused_commander()?
            .ok_or_else(|| SessionError::protocol("not attached to a remote debugger"))?;

        let frames = commander.execute(&commands::Backtrace).await?;
        let total = frames.len();
        let start = args.start_frame.unwrap_or(0);
        let levels = args.levels.filter(|&levels| levels > 0).unwrap_or(usize::MAX);

        let stack_frames = frames
            .into_iter()
            .skip(start)
            .take(levels)
            .map(|frame| StackFrame {
                id: i64::from(frame.position),
                name: frame.call,
                source: Some(Source::from_path(self.source_path(&frame.file))),
                line: frame.line,
                column: 1,
            })
            .collect();

        Ok(Some(ResponseBody::StackTrace(StackTraceResponse {
            stack_frames,
            total_frames: Some(total),
        })))
    }

    fn source_path(&self, file: &str) -> String {
        match &self.config {
            Some(config) => config.source_path(file),
            None => file.to_string(),
        }
    }

    async fn variables(&mut self, args: VariablesArguments) -> RequestResult {
        let commander = self.paused_commander()?;
        let variables = match commander {
            Some(commander) if args.variables_reference == LOCALS_REFERENCE => commander
                .execute(&ListVariables)
                .await?
                .into_iter()
                .map(|entry| Variable {
                    name: entry.key,
                    value: entry.value,
                    r#type: None,
                    variables_reference: 0,
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(Some(ResponseBody::Variables(VariablesResponse { variables })))
    }

    async fn disconnect(&mut self, args: DisconnectArguments) -> RequestResult {
        if args.terminate_debuggee == Some(true) {
            tracing::debug!("terminating the debuggee is not supported, detaching instead");
        }
        if self.state() == SessionState::Terminated {
            return Ok(None);
        }
        self.machine.fire(MachineEvent::Disconnect)?;

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
        self.events = None;

        if let Some(connection) = self.connection.take() {
            tracing::debug!(id = %connection.id(), "closing connection");
            if tokio::time::timeout(DISCONNECT_TIMEOUT, connection.close())
                .await
                .is_err()
            {
                tracing::warn!(
                    timeout = ?DISCONNECT_TIMEOUT,
                    "remote debugger did not close in time, destroying the socket"
                );
            }
            drop(connection);
        }

        self.machine.fire(MachineEvent::Closed)?;
        self.followups.push(EventBody::Terminated);
        Ok(None)
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Received(frame) => {
                tracing::trace!(initial = frame.is_initial(), len = frame.content().len(), "frame received");
            }
            ConnectionEvent::Error { message } => {
                tracing::error!(%message, "remote debugger connection failed");
            }
            ConnectionEvent::Closed { had_error } => {
                tracing::info!(had_error, "remote debugger closed the connection");
                self.events = None;
                self.connection = None;
                if self.machine.fire(MachineEvent::ConnectionLost).is_ok() {
                    self.emit(EventBody::Terminated);
                }
            }
            ConnectionEvent::Created { .. } | ConnectionEvent::Connected { .. } => {}
        }
    }

    fn shutdown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
    }

    fn next_seq(&mut self) -> Seq {
        self.seq += 1;
        self.seq
    }

    fn emit(&mut self, body: EventBody) {
        tracing::debug!(event = body.name(), "sending event");
        let event = OutgoingEvent {
            seq: self.next_seq(),
            body,
        };
        self.send(OutgoingMessage::Event(event));
    }

    fn send(&self, message: OutgoingMessage) {
        if self.outbox.send(message).is_err() {
            tracing::debug!("client writer has gone away");
        }
    }
}

fn arguments<T: DeserializeOwned>(request: &Request) -> Result<T, SessionError> {
    request
        .arguments()
        .map_err(|source| SessionError::InvalidArguments {
            command: request.command.clone(),
            source,
        })
}

/// Everything lives in one flat scope, whatever the frame.
fn scopes(args: ScopesArguments) -> RequestResult {
    tracing::trace!(frame_id = args.frame_id, "listing scopes");
    Ok(Some(ResponseBody::Scopes(ScopesResponse {
        scopes: vec![Scope {
            name: "Locals".to_string(),
            presentation_hint: Some("locals".to_string()),
            variables_reference: LOCALS_REFERENCE,
            expensive: false,
        }],
    })))
}

fn dap_breakpoint(record: &BreakpointRecord) -> types::Breakpoint {
    let source = match &record.target {
        BreakpointTarget::Line { file, .. } => Some(Source::from_path(file.clone())),
        BreakpointTarget::Function { .. } => None,
    };
    types::Breakpoint {
        id: Some(record.id),
        verified: record.verified,
        message: None,
        source,
        line: record.line,
    }
}

fn stopped(reason: StoppedReason) -> EventBody {
    EventBody::Stopped(StoppedEventBody {
        reason,
        thread_id: THREAD_ID,
        all_threads_stopped: Some(true),
    })
}

/// Connect and wait for the banner, both within the configured timeout.
async fn connect<C: Connector>(
    connector: &C,
    config: &SessionConfig,
) -> Result<(Connection, ResponseFrame, EventSource), TransportError> {
    let (connection, mut events) = connector
        .connect(config.address.clone(), config.connect_timeout)
        .await?;

    let banner = tokio::time::timeout(config.connect_timeout, wait_for_banner(&mut events))
        .await
        .map_err(|_| {
            tracing::warn!(timeout = ?config.connect_timeout, "no banner from remote debugger");
            TransportError::ConnectionLost
        })??;
    Ok((connection, banner, events))
}

async fn wait_for_banner(events: &mut EventSource) -> Result<ResponseFrame, TransportError> {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Received(frame) if frame.is_initial() => return Ok(frame),
            ConnectionEvent::Closed { .. } => break,
            other => tracing::trace!(?other, "waiting for banner"),
        }
    }
    Err(TransportError::ConnectionLost)
}

async fn next_event(events: &mut Option<EventSource>) -> Option<ConnectionEvent> {
    match events {
        Some(events) => events.recv().await,
        None => pending().await,
    }
}

async fn resume_outcome(in_flight: &mut Option<InFlight>) -> (Resume, Result<String, CommandError>) {
    let Some(in_flight) = in_flight else {
        return pending().await;
    };
    let result = match (&mut in_flight.handle).await {
        Ok(result) => result,
        Err(e) => {
            tracing::debug!(error = %e, "resume task ended early");
            Err(TransportError::ConnectionLost.into())
        }
    };
    (in_flight.kind, result)
}
