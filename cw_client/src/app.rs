//! Interactive command loop driving one match session.

use anyhow::Result;
use chess_wager::{
    SessionHandle, SessionPresenter,
    currency::CurrencyConverter,
    session::{SessionError, SessionNotice},
};
use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::{
    commands::{Command, HELP, parse_command},
    render,
    rpc_escrow::RpcEscrow,
};

/// What the loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Leave,
}

pub struct App {
    handle: SessionHandle,
    escrow: Arc<RpcEscrow>,
    converter: Arc<CurrencyConverter>,
    balance_refresh: Duration,
    /// Set once the user was warned about leaving an unsettled match
    leave_warned: bool,
}

impl App {
    pub fn new(
        handle: SessionHandle,
        escrow: Arc<RpcEscrow>,
        converter: CurrencyConverter,
        balance_refresh: Duration,
    ) -> Self {
        Self {
            handle,
            escrow,
            converter: Arc::new(converter),
            balance_refresh,
            leave_warned: false,
        }
    }

    /// Run until the user leaves or stdin closes, then close the session.
    pub async fn run(mut self, mut interrupts: mpsc::UnboundedReceiver<()>) -> Result<()> {
        let background = vec![
            self.spawn_renderer(),
            self.spawn_notice_printer(),
            self.spawn_rate_printer(),
            self.spawn_wallet_refresh(),
        ];

        println!("{}", HELP);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let flow = tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) if line.trim().is_empty() => Flow::Continue,
                    Some(line) => match parse_command(&line) {
                        Ok(command) => self.execute(command).await,
                        Err(e) => {
                            println!("{}", e);
                            Flow::Continue
                        }
                    },
                    None => Flow::Leave,
                },
                Some(()) = interrupts.recv() => self.request_leave(),
            };

            if flow == Flow::Leave {
                break;
            }
        }

        match self.handle.close().await {
            Ok(report) => println!("{}", render::close_line(&report)),
            Err(SessionError::Closed) => {}
            Err(e) => println!("Close failed: {}", e),
        }

        // A pending escrow transaction still needs its compensating cancel
        tokio::select! {
            _ = self.handle.closed() => {}
            Some(()) = interrupts.recv() => {
                log::warn!("Exiting before the pending escrow transaction settled");
            }
        }

        for task in background {
            task.abort();
        }
        Ok(())
    }

    async fn execute(&mut self, command: Command) -> Flow {
        let result = match command {
            Command::Create(intent) => {
                self.converter.convert(intent.wager);
                self.handle.submit(intent).await
            }
            Command::Join(code) => self.handle.join(code).await,
            Command::AcceptJoin => self.handle.accept_join().await,
            Command::Cancel => self.handle.cancel().await,
            Command::OfferDraw => self.handle.offer_draw().await,
            Command::AcceptDraw => self.handle.accept_draw().await,
            Command::Resign => self.handle.resign().await,
            Command::Quote(amount) => {
                self.converter.convert(amount);
                Ok(())
            }
            Command::Status => {
                let view = SessionPresenter::new(self.handle.clone()).view();
                println!("{}", render::render_view(&view));
                Ok(())
            }
            Command::Help => {
                println!("{}", HELP);
                Ok(())
            }
            Command::Quit => return self.request_leave(),
        };

        match result {
            Ok(()) => Flow::Continue,
            Err(SessionError::Closed) => Flow::Leave,
            Err(e) => {
                println!("{}", e);
                Flow::Continue
            }
        }
    }

    /// Leave at once when nothing is at stake, otherwise after a second request.
    fn request_leave(&mut self) -> Flow {
        let state = self.handle.state();
        if state.is_settled() || self.leave_warned {
            return Flow::Leave;
        }

        self.leave_warned = true;
        println!(
            "Your match is not settled yet ({}). Leaving now forfeits or abandons it. \
             Repeat to leave anyway",
            state.phase()
        );
        Flow::Continue
    }

    fn spawn_renderer(&self) -> JoinHandle<()> {
        let presenter = SessionPresenter::new(self.handle.clone());
        let mut last = String::new();
        tokio::spawn(presenter.run(move |view| {
            // The clock ticks every second; print only real transitions
            let line = render::summary_line(view);
            if line != last {
                println!("{}", line);
                last = line;
            }
        }))
    }

    fn spawn_notice_printer(&self) -> JoinHandle<()> {
        let mut notices = self.handle.notices();
        let converter = self.converter.clone();
        tokio::spawn(async move {
            loop {
                match notices.recv().await {
                    Ok(notice) => {
                        if let SessionNotice::JoinOfferReceived(offer) = &notice {
                            converter.convert(offer.wager);
                        }
                        println!("{}", render::notice_line(&notice));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("Missed {} session notices", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_rate_printer(&self) -> JoinHandle<()> {
        let mut snapshots = self.converter.subscribe();
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    println!("{}", render::rates_line(&snapshot));
                }
            }
        })
    }

    fn spawn_wallet_refresh(&self) -> JoinHandle<()> {
        let handle = self.handle.clone();
        let escrow = self.escrow.clone();
        let mut ticker = interval(self.balance_refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                match escrow.wallet().await {
                    Ok(wallet) => {
                        if handle.update_wallet(wallet).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("Balance refresh failed: {}", e),
                }
            }
        })
    }
}
