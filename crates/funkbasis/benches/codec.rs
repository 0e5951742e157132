// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! Frame codec benchmarks.
//!
//! The telegram codec runs once per 37.5 ms block per channel on the
//! sample-pump thread, so encode+decode must stay far below that budget.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use funkbasis::protocol::pocsag;
use funkbasis::protocol::telegramm::{decode, encode, Opcode, Telegramm};

fn bench_telegramm(c: &mut Criterion) {
    let telegramm = Telegramm {
        opcode: Opcode::VAG_R,
        fuz_nationalitaet: 2,
        fuz_fuvst_nr: 2,
        fuz_rest_nr: 5,
        futln_nationalitaet: 2,
        futln_heimat_fuvst_nr: 2,
        futln_rest_nr: 22002,
        frequenz_nr: 131,
        ..Telegramm::default()
    };

    c.bench_function("telegramm_encode", |b| {
        b.iter(|| encode(black_box(&telegramm)))
    });

    let bits = encode(&telegramm);
    c.bench_function("telegramm_decode", |b| b.iter(|| decode(black_box(&bits))));
}

fn bench_pocsag(c: &mut Criterion) {
    c.bench_function("pocsag_address", |b| {
        b.iter(|| pocsag::encode_address(black_box(1234), pocsag::Function::Numeric))
    });

    let word = pocsag::encode_address(1234, pocsag::Function::Numeric);
    c.bench_function("pocsag_validate", |b| {
        b.iter(|| pocsag::validate(black_box(word)))
    });
}

criterion_group!(benches, bench_telegramm, bench_pocsag);
criterion_main!(benches);
