// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! POCSAG paging channel.
//!
//! The transmitter runs a batch scheduler: 18 preamble codewords, then
//! batches of one sync word plus 16 codewords arranged as 8 paired slots.
//! An address codeword may only be sent in the slot implied by the low 3
//! bits of its RIC; message codewords follow immediately, crossing batch
//! boundaries if needed. After two idle batches with an empty queue the
//! transmitter turns itself off.
//!
//! The receive side reassembles batches into decoded pages.

use crate::config::{
    POCSAG_CODEWORD_IDLE, POCSAG_CODEWORD_PREAMBLE, POCSAG_CODEWORD_SYNC, POCSAG_IDLE_BATCHES,
    POCSAG_PREAMBLE_COUNT,
};
use crate::dsp::FskTx;
use crate::protocol::pocsag::{
    decode_address, decode_alpha, decode_hex, decode_numeric, validate, Function, MessageCursor,
};
use crate::{debug, info, notice, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;

/// Names of the ASCII control characters, for page text display.
const CTRL_CHAR: [&str; 32] = [
    "<NUL>", "<SOH>", "<STX>", "<ETX>", "<EOT>", "<ENQ>", "<ACK>", "<BEL>", "<BS>", "<HT>",
    "<LF>", "<VT>", "<FF>", "<CR>", "<SO>", "<SI>", "<DLE>", "<DC1>", "<DC2>", "<DC3>", "<DC4>",
    "<NAK>", "<SYN>", "<ETB>", "<CAN>", "<EM>", "<SUB>", "<ESC>", "<FS>", "<GS>", "<RS>", "<US>",
];

/// Transmitter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PocsagState {
    /// Carrier off.
    Idle,
    /// Sending the preamble pattern.
    Preamble,
    /// Sending batches.
    Message,
}

/// Events emitted by a paging channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// A queued message finished all its transmissions.
    Delivered { ric: u32, function: Function },
    /// A page was received (loopback or monitoring).
    Received {
        kanal: u16,
        ric: u32,
        function: Function,
        text: String,
    },
}

/// Create the event queue for a paging channel.
pub fn page_channel() -> (Sender<PageEvent>, Receiver<PageEvent>) {
    unbounded()
}

/// One queued page.
#[derive(Debug)]
struct PocsagMsg {
    ric: u32,
    function: Function,
    cursor: MessageCursor,
    /// Remaining repetitions after the current transmission.
    repeat: u32,
}

/// Static configuration of one POCSAG channel.
#[derive(Debug, Clone)]
pub struct PocsagConfig {
    /// Channel number (only used for display and events).
    pub kanal: u16,
    /// Radio sample rate.
    pub samplerate: u32,
    /// Transmission baud rate (512, 1200 or 2400).
    pub baudrate: f64,
    /// Transmitter enabled.
    pub tx: bool,
}

impl Default for PocsagConfig {
    fn default() -> Self {
        Self {
            kanal: 1,
            samplerate: 48000,
            baudrate: 1200.0,
            tx: true,
        }
    }
}

/// One POCSAG paging channel.
pub struct Pocsag {
    kanal: u16,
    tx: bool,
    state: PocsagState,
    msg_list: VecDeque<PocsagMsg>,
    current: Option<PocsagMsg>,
    word_count: u8,
    idle_count: u8,
    events: Sender<PageEvent>,

    // RX assembly
    rx_valid: bool,
    rx_ric: u32,
    rx_function: Function,
    rx_data: Vec<u8>,
    rx_bit_index: u8,

    // DSP
    fsk_tx: FskTx,
    tx_buffer: Vec<i16>,
    tx_pos: usize,
}

impl Pocsag {
    /// Create a paging channel.
    pub fn new(config: PocsagConfig, events: Sender<PageEvent>) -> Result<Self> {
        debug!(
            "Creating 'POCSAG' instance for channel = {} ({} baud).",
            config.kanal, config.baudrate
        );
        Ok(Self {
            kanal: config.kanal,
            tx: config.tx,
            state: PocsagState::Idle,
            msg_list: VecDeque::new(),
            current: None,
            word_count: 0,
            idle_count: 0,
            events,
            rx_valid: false,
            rx_ric: 0,
            rx_function: Function::Numeric,
            rx_data: Vec::new(),
            rx_bit_index: 0,
            fsk_tx: FskTx::new(config.samplerate, config.baudrate, 0.0, 1.0, 0.0)?,
            tx_buffer: Vec::new(),
            tx_pos: 0,
        })
    }

    /// Channel number.
    pub fn kanal(&self) -> u16 {
        self.kanal
    }

    /// Transmitter state.
    pub fn state(&self) -> PocsagState {
        self.state
    }

    /// Queue a page and start the transmitter if it is off.
    ///
    /// `repeat` is the number of re-transmissions after the first one.
    pub fn msg_send(&mut self, ric: u32, function: Function, text: &str, repeat: u32) {
        info!(
            "Queueing message to RIC '{}' / function '{}' ({})",
            ric,
            function as u8,
            function.name()
        );
        self.msg_list.push_back(PocsagMsg {
            ric,
            function,
            cursor: MessageCursor::new(text),
            repeat,
        });

        if self.tx && self.state == PocsagState::Idle {
            self.state = PocsagState::Preamble;
            self.word_count = 0;
            self.idle_count = 0;
        }
    }

    /// Finish the current or found message after its last codeword:
    /// requeue it for a repeat or report it delivered.
    fn finish_msg(&mut self, mut msg: PocsagMsg) {
        if msg.repeat > 0 {
            msg.repeat -= 1;
            msg.cursor.rewind();
            self.msg_list.push_back(msg);
        } else {
            let _ = self.events.try_send(PageEvent::Delivered {
                ric: msg.ric,
                function: msg.function,
            });
        }
    }

    /// Next codeword toward the modulator, `None` while the transmitter
    /// is off.
    pub fn get_codeword(&mut self) -> Option<u32> {
        let slot = self.word_count.wrapping_sub(1) >> 1;
        let subslot = self.word_count.wrapping_sub(1) & 1;

        if !self.tx {
            return None;
        }

        match self.state {
            PocsagState::Idle => None,
            PocsagState::Preamble => {
                if self.word_count == 0 {
                    info!("Sending preamble.");
                }
                debug!(
                    "Sending 32 bits of preamble pattern 0x{:08x}.",
                    POCSAG_CODEWORD_PREAMBLE
                );
                self.word_count += 1;
                if self.word_count == POCSAG_PREAMBLE_COUNT {
                    self.state = PocsagState::Message;
                    self.word_count = 0;
                    self.idle_count = 0;
                }
                Some(POCSAG_CODEWORD_PREAMBLE)
            }
            PocsagState::Message => {
                if self.word_count == 0 {
                    info!("Sending batch.");
                    debug!(
                        "Sending 32 bits of sync pattern 0x{:08x}.",
                        POCSAG_CODEWORD_SYNC
                    );
                    self.word_count += 1;
                    return Some(POCSAG_CODEWORD_SYNC);
                }

                // continue an ongoing message
                if let Some(mut msg) = self.current.take() {
                    self.idle_count = 0;
                    let word = match msg.function {
                        Function::Numeric => msg.cursor.encode_numeric(),
                        Function::Alpha => msg.cursor.encode_alpha(),
                        // should never happen, tone pages carry no data
                        _ => POCSAG_CODEWORD_IDLE,
                    };
                    if msg.cursor.done() {
                        self.finish_msg(msg);
                    } else {
                        self.current = Some(msg);
                    }
                    debug!(
                        "Sending 32 bits of message codeword 0x{:08x} (frame {}.{}).",
                        word, slot, subslot
                    );
                    self.word_count += 1;
                    if self.word_count == 17 {
                        self.word_count = 0;
                    }
                    return Some(word);
                }

                // about to send an address codeword: search for a message
                // matching the right time slot
                if let Some(pos) = self.msg_list.iter().position(|m| (m.ric & 7) as u8 == slot) {
                    let msg = self.msg_list.remove(pos).expect("position is valid");
                    info!(
                        "Sending message to RIC '{}' / function '{}' ({})",
                        msg.ric,
                        msg.function as u8,
                        msg.function.name()
                    );
                    self.idle_count = 0;
                    let word = crate::protocol::pocsag::encode_address(msg.ric, msg.function);
                    let has_body = matches!(msg.function, Function::Numeric | Function::Alpha)
                        && msg.cursor.has_data();
                    if has_body {
                        self.current = Some(msg);
                    } else {
                        self.finish_msg(msg);
                    }
                    debug!(
                        "Sending 32 bits of address codeword 0x{:08x} (frame {}.{}).",
                        word, slot, subslot
                    );
                    self.word_count += 1;
                    if self.word_count == 17 {
                        self.word_count = 0;
                    }
                    return Some(word);
                }

                // no message: send the idle pattern
                debug!(
                    "Sending 32 bits of idle pattern 0x{:08x} (frame {}.{}).",
                    POCSAG_CODEWORD_IDLE, slot, subslot
                );
                self.word_count += 1;
                if self.word_count == 17 {
                    self.word_count = 0;
                    // turn the transmitter off after enough idle batches
                    if self.msg_list.is_empty() && self.current.is_none() {
                        if self.idle_count == POCSAG_IDLE_BATCHES {
                            info!("Transmission done.");
                            debug!(
                                "Reached {} idle batches, turning transmitter off.",
                                POCSAG_IDLE_BATCHES
                            );
                            self.state = PocsagState::Idle;
                        }
                        self.idle_count += 1;
                    }
                }
                Some(POCSAG_CODEWORD_IDLE)
            }
        }
    }

    /// Feed one received codeword into the batch reassembly.
    ///
    /// `slot` is the codeword's slot within its batch, negative for the
    /// sync position.
    pub fn put_codeword(&mut self, word: u32, slot: i8, subslot: i8) {
        if slot < 0 && word == POCSAG_CODEWORD_SYNC {
            debug!("Received 32 bits of sync pattern 0x{:08x}.", word);
            return;
        }

        if word == POCSAG_CODEWORD_IDLE {
            debug!("Received 32 bits of idle pattern 0x{:08x}.", word);
        } else if word & 0x80000000 == 0 {
            debug!(
                "Received 32 bits of address codeword 0x{:08x} (frame {}.{}).",
                word, slot, subslot
            );
        } else {
            debug!(
                "Received 32 bits of message codeword 0x{:08x} (frame {}.{}).",
                word, slot, subslot
            );
        }

        if !validate(word) {
            notice!("CRC or parity error in codeword 0x{:08x}.", word);
            self.done_rx_msg();
            return;
        }

        if word == POCSAG_CODEWORD_IDLE {
            self.done_rx_msg();
            return;
        }

        if word & 0x80000000 == 0 {
            self.done_rx_msg();
            self.rx_valid = true;
            let (ric, function) = decode_address(word, slot.max(0) as u8);
            self.rx_ric = ric;
            self.rx_function = function;
            self.rx_data.clear();
            self.rx_bit_index = 0;
        } else {
            if !self.rx_valid {
                return;
            }
            match self.rx_function {
                Function::Numeric => decode_numeric(word, &mut self.rx_data),
                Function::Alpha => decode_alpha(word, &mut self.rx_data, &mut self.rx_bit_index),
                _ => decode_hex(word, &mut self.rx_data),
            }
        }
    }

    /// Complete the page under reassembly and report it.
    fn done_rx_msg(&mut self) {
        if !self.rx_valid {
            return;
        }
        self.rx_valid = false;

        // an unfinished alphanumeric character is dropped
        if self.rx_function == Function::Alpha && self.rx_bit_index != 0 {
            self.rx_data.pop();
        }

        info!(
            "Received message from RIC '{}' / function '{}' ({})",
            self.rx_ric,
            self.rx_function as u8,
            self.rx_function.name()
        );

        let mut text = String::new();
        for &c in &self.rx_data {
            if c == 127 {
                text.push_str("<DEL>");
            } else if c < 32 {
                text.push_str(CTRL_CHAR[c as usize]);
            } else {
                text.push(char::from(c));
            }
        }
        // alphanumeric padding is EOT, strip it from display
        let text = text.replace("<EOT>", "");
        if matches!(self.rx_function, Function::Numeric | Function::Alpha) && !text.is_empty() {
            info!(" -> Message text is \"{}\".", text);
        }
        let _ = self.events.try_send(PageEvent::Received {
            kanal: self.kanal,
            ric: self.rx_ric,
            function: self.rx_function,
            text,
        });
    }

    /// Provide the next transmit samples toward the radio.
    pub fn fill_tx_samples(&mut self, samples: &mut [i16]) {
        let mut filled = 0;
        while filled < samples.len() {
            if self.tx_pos == 0 && self.tx_buffer.is_empty() {
                let Some(word) = self.get_codeword() else {
                    // transmitter off
                    for s in &mut samples[filled..] {
                        *s = 0;
                    }
                    return;
                };
                let mut bits = [0u8; 32];
                for (i, b) in bits.iter_mut().enumerate() {
                    *b = ((word >> (31 - i)) & 1) as u8;
                }
                self.fsk_tx.encode_block(&bits, 0, &mut self.tx_buffer);
            }

            let copy = (self.tx_buffer.len() - self.tx_pos).min(samples.len() - filled);
            samples[filled..filled + copy]
                .copy_from_slice(&self.tx_buffer[self.tx_pos..self.tx_pos + copy]);
            self.tx_pos += copy;
            filled += copy;
            if self.tx_pos == self.tx_buffer.len() {
                self.tx_pos = 0;
                self.tx_buffer.clear();
            }
        }
    }
}
