// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Full POCSAG transmission cycles through the public scheduler API.

use funkbasis::config::{
    POCSAG_CODEWORD_IDLE, POCSAG_CODEWORD_PREAMBLE, POCSAG_CODEWORD_SYNC, POCSAG_PREAMBLE_COUNT,
};
use funkbasis::pocsag::{page_channel, PageEvent, Pocsag, PocsagConfig};
use funkbasis::protocol::pocsag::{validate, Function};

#[test]
fn test_numeric_page_transmission_cycle() {
    let (events_tx, events) = page_channel();
    let mut pocsag = Pocsag::new(PocsagConfig::default(), events_tx).expect("channel");

    pocsag.msg_send(1234, Function::Numeric, "12345", 0);

    // preamble first
    let mut words = Vec::new();
    while let Some(word) = pocsag.get_codeword() {
        words.push(word);
        if words.len() > 200 {
            break;
        }
    }

    let preamble = &words[..POCSAG_PREAMBLE_COUNT as usize];
    assert!(preamble.iter().all(|&w| w == POCSAG_CODEWORD_PREAMBLE));

    // first batch: sync, idle until the RIC's slot, address + message
    let batch = &words[POCSAG_PREAMBLE_COUNT as usize..];
    assert_eq!(batch[0], POCSAG_CODEWORD_SYNC);
    let address_pos = 1 + 2 * ((1234 & 7) as usize);
    for &w in &batch[1..address_pos] {
        assert_eq!(w, POCSAG_CODEWORD_IDLE);
    }
    assert_eq!(batch[address_pos] & 0x8000_0000, 0, "address codeword");
    assert_ne!(
        batch[address_pos + 1] & 0x8000_0000,
        0,
        "message codeword follows"
    );
    for &w in &batch[address_pos + 2..17] {
        assert_eq!(w, POCSAG_CODEWORD_IDLE, "idle to end of batch");
    }

    // every codeword of every batch passes CRC and parity
    for &w in batch {
        assert!(validate(w));
    }

    // the transmitter turned itself off after the idle batches
    assert_eq!(pocsag.get_codeword(), None);

    // loop every batch back into the receiver and recover the page
    for (i, &w) in batch.iter().enumerate() {
        let in_batch = i % 17;
        let slot = if in_batch == 0 {
            -1
        } else {
            ((in_batch - 1) / 2) as i8
        };
        pocsag.put_codeword(w, slot, ((in_batch.max(1) - 1) % 2) as i8);
    }

    let mut received = None;
    while let Ok(event) = events.try_recv() {
        if let PageEvent::Received { .. } = event {
            received = Some(event);
        }
    }
    assert_eq!(
        received,
        Some(PageEvent::Received {
            kanal: 1,
            ric: 1234,
            function: Function::Numeric,
            text: "12345".to_string(),
        })
    );
}

#[test]
fn test_single_address_batch_decodes_to_messageless_page() {
    let (events_tx, events) = page_channel();
    let mut pocsag = Pocsag::new(PocsagConfig::default(), events_tx).expect("channel");

    // an address codeword followed by idle words only
    pocsag.put_codeword(POCSAG_CODEWORD_SYNC, -1, -1);
    pocsag.put_codeword(
        funkbasis::protocol::pocsag::encode_address(1234, Function::Tone2),
        (1234 & 7) as i8,
        0,
    );
    for i in 0..15 {
        pocsag.put_codeword(POCSAG_CODEWORD_IDLE, ((i + 5) / 2) as i8, 0);
    }

    let event = events.try_recv().expect("page event");
    assert_eq!(
        event,
        PageEvent::Received {
            kanal: 1,
            ric: 1234,
            function: Function::Tone2,
            text: String::new(),
        }
    );
}
