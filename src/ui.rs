use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use anyhow::Result;

use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Wrap};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use std::fmt::Write as _;
use tracing_subscriber::layer::{Context, Layer};

use crate::desk::{DeskSnapshot, NoticeLevel, OtcDesk};
use crate::dispatcher::Action;
use crate::types::{PaymentMethod, TradeStatus};
use crate::view::{build_view, BuyerPanel, Connection, FormState, OwnerPanel, Panel, View};

const MAX_LOG_LINES: usize = 500;

// Forwards formatted tracing events into the activity pane
pub struct LogForwarderLayer {
    sender: mpsc::Sender<String>,
}

impl LogForwarderLayer {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }
}

struct StringVisitor {
    message: String,
}

impl StringVisitor {
    fn new() -> Self {
        Self { message: String::new() }
    }
}

impl Visit for StringVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            let _ = write!(&mut self.message, "{}", value);
        } else {
            let _ = write!(&mut self.message, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(&mut self.message, "{:?}", value);
        } else {
            let _ = write!(&mut self.message, " {}={:?}", field.name(), value);
        }
    }
}

impl<S> Layer<S> for LogForwarderLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = StringVisitor::new();
        event.record(&mut visitor);
        let mut msg = String::new();
        let _ = write!(msg, "{} {}: {}", chrono::Local::now().format("%H:%M:%S"), meta.level(), visitor.message);
        let _ = self.sender.try_send(msg);
    }
}

/// Form field currently receiving keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputField {
    BuyerAddress,
    Amount,
    NativeRate,
    StableRate,
    PaymentInfo,
}

impl InputField {
    fn label(self) -> &'static str {
        match self {
            InputField::BuyerAddress => "Buyer / recipient",
            InputField::Amount => "Amount",
            InputField::NativeRate => "Native rate",
            InputField::StableRate => "Stable rate",
            InputField::PaymentInfo => "Payment details",
        }
    }
}

const OWNER_FIELDS: [InputField; 4] = [
    InputField::BuyerAddress,
    InputField::Amount,
    InputField::NativeRate,
    InputField::StableRate,
];
const BUYER_FIELDS: [InputField; 2] = [InputField::Amount, InputField::PaymentInfo];

struct UiState {
    form: FormState,
    editing: Option<InputField>,
    selected_trade: usize,
    logs: VecDeque<String>,
}

impl UiState {
    fn field_mut(&mut self, field: InputField) -> &mut String {
        match field {
            InputField::BuyerAddress => &mut self.form.buyer_address,
            InputField::Amount => &mut self.form.amount,
            InputField::NativeRate => &mut self.form.native_rate_input,
            InputField::StableRate => &mut self.form.stable_rate_input,
            InputField::PaymentInfo => &mut self.form.other_payment_info,
        }
    }

    fn field(&self, field: InputField) -> &str {
        match field {
            InputField::BuyerAddress => &self.form.buyer_address,
            InputField::Amount => &self.form.amount,
            InputField::NativeRate => &self.form.native_rate_input,
            InputField::StableRate => &self.form.stable_rate_input,
            InputField::PaymentInfo => &self.form.other_payment_info,
        }
    }

    fn next_field(&mut self, owner: bool) {
        let fields: &[InputField] = if owner { &OWNER_FIELDS } else { &BUYER_FIELDS };
        let next = match self.editing.and_then(|f| fields.iter().position(|x| *x == f)) {
            Some(i) => fields[(i + 1) % fields.len()],
            None => fields[0],
        };
        self.editing = Some(next);
    }
}

fn spawn_action(desk: &Arc<OtcDesk>, action: Action) {
    let desk = Arc::clone(desk);
    tokio::spawn(async move {
        // outcome lands in the desk notice
        let _ = desk.perform(action).await;
    });
}

pub async fn run_dashboard(desk: Arc<OtcDesk>, mut log_rx: mpsc::Receiver<String>) -> Result<()> {
    // Terminal setup
    enable_raw_mode()?;
    std::io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(std::io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let snapshot_rx = desk.watch();
    let rates = desk.snapshot().rates;
    let mut state = UiState {
        form: FormState {
            native_rate_input: crate::types::format_amount(rates.native),
            stable_rate_input: crate::types::format_amount(rates.stable),
            ..Default::default()
        },
        editing: None,
        selected_trade: 0,
        logs: VecDeque::with_capacity(MAX_LOG_LINES),
    };
    let mut last_draw = Instant::now() - Duration::from_secs(1);

    loop {
        while let Ok(log) = log_rx.try_recv() {
            if state.logs.len() >= MAX_LOG_LINES {
                state.logs.pop_front();
            }
            state.logs.push_back(log);
        }

        let snapshot: DeskSnapshot = snapshot_rx.borrow().clone();
        let view = build_view(&snapshot, &state.form, desk.config());
        if !view.trades.is_empty() {
            state.selected_trade = state.selected_trade.min(view.trades.len() - 1);
        }

        // Draw at ~20 FPS max
        if last_draw.elapsed() >= Duration::from_millis(50) {
            terminal.draw(|f| render(f, &view, &state, desk.config()))?;
            last_draw = Instant::now();
        }

        if crossterm::event::poll(Duration::from_millis(20))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let owner = matches!(view.panel, Panel::Owner(_));

                if let Some(field) = state.editing {
                    match key.code {
                        KeyCode::Enter | KeyCode::Esc => state.editing = None,
                        KeyCode::Tab => state.next_field(owner),
                        KeyCode::Backspace => {
                            state.field_mut(field).pop();
                        }
                        KeyCode::Char(c) => state.field_mut(field).push(c),
                        _ => {}
                    }
                    continue;
                }

                let selected = snapshot.trades.get(state.selected_trade).cloned();
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Tab | KeyCode::Char('e') => state.next_field(owner),
                    KeyCode::Up => state.selected_trade = state.selected_trade.saturating_sub(1),
                    KeyCode::Down => state.selected_trade = state.selected_trade.saturating_add(1),
                    KeyCode::Char('c') => {
                        let desk = Arc::clone(&desk);
                        tokio::spawn(async move {
                            let _ = desk.connect().await;
                        });
                    }
                    KeyCode::Char('n') => {
                        let desk = Arc::clone(&desk);
                        tokio::spawn(async move {
                            let _ = desk.switch_network().await;
                        });
                    }
                    KeyCode::Char('r') => {
                        let desk = Arc::clone(&desk);
                        tokio::spawn(async move { desk.refresh().await });
                    }
                    KeyCode::Char('l') => {
                        if let Some(trade) = selected {
                            spawn_action(&desk, Action::ReleaseTrade(trade));
                        }
                    }
                    KeyCode::Char('x') => {
                        if let Some(trade) = selected {
                            spawn_action(&desk, Action::CancelTrade(trade));
                        }
                    }
                    KeyCode::Char('a') if owner => spawn_action(&desk, Action::ApproveToken),
                    KeyCode::Char('t') if owner => spawn_action(
                        &desk,
                        Action::CreateTrade {
                            buyer: state.form.buyer_address.clone(),
                            amount: state.form.amount.clone(),
                        },
                    ),
                    KeyCode::Char('d') if owner => spawn_action(
                        &desk,
                        Action::DirectTransfer {
                            recipient: state.form.buyer_address.clone(),
                            amount: state.form.amount.clone(),
                        },
                    ),
                    KeyCode::Char('v') if owner => {
                        if let Some(trade) = selected {
                            spawn_action(
                                &desk,
                                Action::ResolveDispute {
                                    trade_id: trade.id,
                                    recipient: state.form.buyer_address.clone(),
                                },
                            );
                        }
                    }
                    KeyCode::Char('s') if owner => spawn_action(
                        &desk,
                        Action::SetExchangeRates {
                            native: state.form.native_rate_input.clone(),
                            stable: state.form.stable_rate_input.clone(),
                        },
                    ),
                    KeyCode::Char('u') if !owner => spawn_action(&desk, Action::ApproveStable),
                    KeyCode::Char('m') if !owner => {
                        state.form.payment_method = state.form.payment_method.next();
                    }
                    KeyCode::Char('b') if !owner => {
                        let amount = state.form.amount.clone();
                        let action = match state.form.payment_method {
                            PaymentMethod::Native => Action::BuyWithNative { amount },
                            PaymentMethod::Stable => Action::BuyWithStable { amount },
                            PaymentMethod::Other => Action::BuyOffPlatform {
                                amount,
                                method_info: state.form.other_payment_info.clone(),
                            },
                        };
                        spawn_action(&desk, action);
                    }
                    _ => {}
                }
            }
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    std::io::stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

fn render(f: &mut Frame, view: &View, state: &UiState, config: &crate::config::Config) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(0), Constraint::Length(3)])
        .split(f.size());

    render_header(f, main_layout[0], view);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_layout[1]);

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(6)])
        .split(main_chunks[0]);

    match &view.panel {
        Panel::Owner(panel) => render_owner_panel(f, left_chunks[0], panel, state, config),
        Panel::Buyer(panel) => render_buyer_panel(f, left_chunks[0], panel, state),
    }
    render_notice(f, left_chunks[1], view);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_chunks[1]);

    render_trades(f, right_chunks[0], view, state.selected_trade);
    render_activity(f, right_chunks[1], &state.logs);

    render_status_bar(f, main_layout[2], view, state);
}

fn render_header(f: &mut Frame, area: Rect, view: &View) {
    let (status, status_style) = match &view.header.connection {
        Connection::Disconnected => ("Not connected".to_string(), Style::default().fg(Color::Gray)),
        Connection::WrongNetwork(id) => (
            format!("Unsupported chain {} (press n to switch)", id),
            Style::default().fg(Color::Red),
        ),
        Connection::Ready { chain_id } => (format!("Chain {}", chain_id), Style::default().fg(Color::Green)),
    };

    let mut first = vec![
        Span::styled("OTC Desk", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" | "),
        Span::styled(status, status_style),
    ];
    if let Some(account) = &view.header.account {
        first.push(Span::raw(format!(" | {}", account)));
    }
    if view.busy {
        first.push(Span::styled(" | waiting for confirmation...", Style::default().fg(Color::Yellow)));
    }

    let balances = view
        .header
        .balances
        .iter()
        .map(|(symbol, amount)| format!("{}: {}", symbol, amount))
        .collect::<Vec<_>>()
        .join("   ");

    let header = Paragraph::new(vec![Line::from(first), Line::from(balances)])
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(header, area);
}

fn input_line(state: &UiState, field: InputField) -> Line<'static> {
    let active = state.editing == Some(field);
    let value = state.field(field).to_string();
    let style = if active {
        Style::default().fg(Color::Black).bg(Color::Yellow)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::styled(format!("{:>18}: ", field.label()), Style::default().fg(Color::Gray)),
        Span::styled(if active { format!("{}_", value) } else { value }, style),
    ])
}

fn render_owner_panel(f: &mut Frame, area: Rect, panel: &OwnerPanel, state: &UiState, config: &crate::config::Config) {
    let mut lines = vec![
        Line::from(Span::styled("Owner", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
        Line::from(format!("Escrow allowance: {} {}", panel.token_allowance, config.token_symbol)),
        Line::from(format!(
            "Saved rates: {} {} / {} {} per {}",
            panel.native_rate, config.native_symbol, panel.stable_rate, config.stable_symbol, config.token_symbol
        )),
        Line::from(""),
    ];
    for field in OWNER_FIELDS {
        lines.push(input_line(state, field));
    }
    lines.push(Line::from(""));
    if !state.form.buyer_address.is_empty() && !panel.buyer_valid {
        lines.push(Line::from(Span::styled("Buyer address is not valid", Style::default().fg(Color::Red))));
    }
    if panel.needs_approval {
        lines.push(Line::from(Span::styled(
            "Amount exceeds the escrow allowance, approve first (a)",
            Style::default().fg(Color::Yellow),
        )));
    }
    lines.push(Line::from(
        "a=approve  t=create trade  d=direct transfer  s=save rates  v=resolve selected",
    ));

    let widget = Paragraph::new(lines)
        .block(Block::default().title("Seller").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}

fn render_buyer_panel(f: &mut Frame, area: Rect, panel: &BuyerPanel, state: &UiState) {
    let mut lines = vec![
        Line::from(Span::styled("Buyer", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
        Line::from(format!("Payment method: {} (m to change)", panel.method_label)),
        Line::from(format!("Stablecoin allowance: {}", panel.stable_allowance)),
        Line::from(""),
    ];
    for field in BUYER_FIELDS {
        if field == InputField::PaymentInfo && panel.method != PaymentMethod::Other {
            continue;
        }
        lines.push(input_line(state, field));
    }
    if let Some(estimate) = &panel.estimate {
        lines.push(Line::from(format!("Estimated payment: {}", estimate)));
    }
    lines.push(Line::from(""));
    let buy_style = if panel.can_buy {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    lines.push(Line::from(vec![
        Span::styled("b=buy", buy_style),
        Span::raw("  u=approve stablecoin"),
    ]));

    let widget = Paragraph::new(lines)
        .block(Block::default().title("Purchase").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}

fn render_notice(f: &mut Frame, area: Rect, view: &View) {
    let (text, style) = match &view.notice {
        Some(notice) => {
            let color = match notice.level {
                NoticeLevel::Info => Color::Gray,
                NoticeLevel::Success => Color::Green,
                NoticeLevel::Warning => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            (
                format!("[{}] {}", notice.at.format("%H:%M:%S"), notice.text),
                Style::default().fg(color),
            )
        }
        None => ("Press c to connect your wallet".to_string(), Style::default().fg(Color::Gray)),
    };
    let widget = Paragraph::new(text)
        .style(style)
        .block(Block::default().title("Notice").borders(Borders::ALL))
        .wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}

fn render_trades(f: &mut Frame, area: Rect, view: &View, selected: usize) {
    let rows: Vec<Row> = view
        .trades
        .iter()
        .enumerate()
        .map(|(i, trade)| {
            let status_style = match trade.status {
                TradeStatus::Open => Style::default().fg(Color::Yellow),
                TradeStatus::Released => Style::default().fg(Color::Green),
                TradeStatus::Cancelled => Style::default().fg(Color::Red),
            };
            let row = Row::new(vec![
                Cell::from(format!("#{}", trade.id)),
                Cell::from(trade.seller.clone()),
                Cell::from(trade.buyer.clone()),
                Cell::from(trade.amount.clone()),
                Cell::from(trade.status.to_string()).style(status_style),
                Cell::from(if trade.can_act { "l/x" } else { "" }),
            ]);
            if i == selected {
                row.style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                row
            }
        })
        .collect();

    let title = match &view.ledger_error {
        Some(e) => format!("Trades ({}) - refresh failed: {}", view.trades.len(), e),
        None => format!("Trades ({})", view.trades.len()),
    };
    let table = Table::new(
        rows,
        [
            Constraint::Length(5),  // Id
            Constraint::Length(14), // Seller
            Constraint::Length(14), // Buyer
            Constraint::Min(10),    // Amount
            Constraint::Length(10), // Status
            Constraint::Length(4),  // Actions
        ],
    )
    .header(
        Row::new(vec!["Id", "Seller", "Buyer", "Amount", "Status", ""])
            .style(Style::default().add_modifier(Modifier::BOLD))
            .bottom_margin(1),
    )
    .block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(table, area);
}

fn render_activity(f: &mut Frame, area: Rect, logs: &VecDeque<String>) {
    let items: Vec<ListItem> = logs
        .iter()
        .rev()
        .take((area.height as usize).saturating_sub(2))
        .map(|log| {
            let style = if log.contains("ERROR") {
                Style::default().fg(Color::Red)
            } else if log.contains("WARN") {
                Style::default().fg(Color::Yellow)
            } else if log.contains("confirmed") || log.contains("succeeded") {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            };
            ListItem::new(Line::from(Span::styled(log.clone(), style)))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!("Activity ({})", logs.len()))
            .borders(Borders::ALL),
    );
    f.render_widget(list, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, view: &View, state: &UiState) {
    let mode = match state.editing {
        Some(field) => format!("Editing {} (Enter to finish, Tab for next field)", field.label()),
        None => "c=connect  n=network  r=refresh  Tab=edit  Up/Down=select  l=release  x=cancel  q=quit".to_string(),
    };
    let role = match view.panel {
        Panel::Owner(_) => "owner",
        Panel::Buyer(_) => "buyer",
    };
    let status_bar = Paragraph::new(Line::from(vec![
        Span::styled(format!("[{}] ", role), Style::default().fg(Color::Cyan)),
        Span::styled("Controls: ", Style::default().fg(Color::Yellow)),
        Span::raw(mode),
    ]))
    .block(Block::default().borders(Borders::ALL))
    .alignment(Alignment::Center);
    f.render_widget(status_bar, area);
}
