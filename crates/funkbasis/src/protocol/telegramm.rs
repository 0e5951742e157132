// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 funkbasis.dev

//! C-Netz telegram codec.
//!
//! Every on-air block carries one telegram of 184 data bits:
//!
//! ```text
//!  0                    22                 33                      183
//! +----------------------+------------------+-----------------------+-+
//! |  run-in (10101...)   |  Barker-11 sync  |  10 x (15,7) BCH      |P|
//! |  22 bits             |  11 bits         |  interleaved, 150 bits| |
//! +----------------------+------------------+-----------------------+-+
//! ```
//!
//! The ten BCH codewords carry 70 information bits: a 6-bit opcode followed
//! by 64 payload bits whose layout depends on the opcode (see the field
//! tables below). `P` is one even-parity bit over the 150 coded bits. The
//! codewords are interleaved column-wise so that a burst hitting adjacent
//! bits lands in different codewords.
//!
//! In distributed signalling the same 184 bits are spread over 46 four-bit
//! bursts between voice windows; the bit order on the wire is identical.

use crate::protocol::bch;

/// Number of data bits of one telegram block.
pub const TELEGRAMM_BITS: usize = 184;

/// Length of the alternating run-in preceding the sync word.
const RUN_IN_BITS: usize = 22;

/// Barker-11 synchronisation sequence.
const BARKER: [u8; 11] = [1, 1, 1, 0, 0, 0, 1, 0, 0, 1, 0];

/// Information bits per telegram (6-bit opcode + 64 payload bits).
const INFO_BITS: usize = 70;

/// Number of BCH codewords per telegram.
const CODEWORDS: usize = INFO_BITS / bch::DATA_BITS;

// =======================================================================
// Opcode catalogue
// =======================================================================

/// Channel class a telegram is valid on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockClass {
    /// Organisation channel, rufblock sub-phase (paging).
    OgkRufblock,
    /// Organisation channel, meldeblock sub-phase (access).
    OgkMeldeblock,
    /// Speech channel, concentrated signalling.
    SpkConcentrated,
    /// Speech channel, distributed signalling.
    SpkDistributed,
}

/// Direction of a telegram on the air interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Base station to mobile station.
    Downlink,
    /// Mobile station to base station.
    Uplink,
}

/// C-Netz telegram opcodes.
///
/// The suffix encodes the block class: `_R` rufblock, `_M` meldeblock,
/// `_K` concentrated speech channel, `_V` distributed speech channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
#[repr(u8)]
pub enum Opcode {
    /// "Einbuchen" - attach request (uplink).
    EM_R = 0,
    /// "Umbuchen" - roaming request (uplink).
    UM_R = 1,
    /// "Verbindungswunsch gehend" - outgoing call request (uplink).
    VWG_R = 2,
    /// "Sofortruf gehend" - outgoing emergency call request (uplink).
    SRG_R = 3,
    /// "Leerruf" - idle broadcast.
    LR_R = 4,
    /// "Einbuchquittung" - attach acknowledge.
    EBQ_R = 5,
    /// "Umbuchquittung" - roaming acknowledge.
    UBQ_R = 6,
    /// "Wahlbestaetigung positiv" - dialing accepted.
    WBP_R = 7,
    /// "Wahlbestaetigung negativ" - dialing rejected.
    WBN_R = 8,
    /// "Verbindungsaufbau gehend" - channel assignment, outgoing.
    VAG_R = 9,
    /// "Verbindungsaufbau kommend" - channel assignment, incoming.
    VAK_R = 10,
    /// "Meldeleerruf" - idle broadcast on the meldeblock.
    MLR_M = 11,
    /// "Wahlaufforderung" - dialing prompt.
    WAF_M = 12,
    /// "Wahluebertragung" - dialed digits (uplink).
    WUE_M = 13,
    /// "Belegung" - channel seizure (uplink).
    BEL_K = 14,
    /// "Belegungsquittung" - seizure acknowledge.
    BQ_K = 15,
    /// "Quittung Verbindung halten" - hold acknowledge.
    VHQ_K = 16,
    /// "Verbindung halten" - hold (uplink).
    VH_K = 17,
    /// "Rufton anschalten" - ringing order.
    RTA_K = 18,
    /// "Rufton anschalten Quittung" - ringing acknowledge (uplink).
    RTAQ_K = 19,
    /// "Abheben" - off-hook (uplink).
    AH_K = 20,
    /// "Abhebequittung" - off-hook acknowledge.
    AHQ_K = 21,
    /// "Durchschalten Befehl" - through-connect order.
    DSB_K = 22,
    /// "Durchschaltung Quittung" - through-connect acknowledge (uplink).
    DSQ_K = 23,
    /// "Ausloesen durch FuFSt" - release by base station.
    AF_K = 24,
    /// "Ausloesen durch FuTln" - release by mobile station (uplink).
    AT_K = 25,
    /// "Quittung Verbindung halten 1" - hold acknowledge, sub-frames 1/3.
    VHQ1_V = 26,
    /// "Quittung Verbindung halten 2" - hold acknowledge, sub-frames 2/4.
    VHQ2_V = 27,
    /// "Verbindung halten" - hold (uplink).
    VH_V = 28,
    /// "Ausloesen durch FuFSt" - release by base station.
    AF_V = 29,
    /// "Ausloesen durch FuTln" - release by mobile station (uplink).
    AT_V = 30,
}

impl Opcode {
    /// All opcodes, in catalogue order.
    pub const ALL: [Opcode; 31] = [
        Opcode::EM_R,
        Opcode::UM_R,
        Opcode::VWG_R,
        Opcode::SRG_R,
        Opcode::LR_R,
        Opcode::EBQ_R,
        Opcode::UBQ_R,
        Opcode::WBP_R,
        Opcode::WBN_R,
        Opcode::VAG_R,
        Opcode::VAK_R,
        Opcode::MLR_M,
        Opcode::WAF_M,
        Opcode::WUE_M,
        Opcode::BEL_K,
        Opcode::BQ_K,
        Opcode::VHQ_K,
        Opcode::VH_K,
        Opcode::RTA_K,
        Opcode::RTAQ_K,
        Opcode::AH_K,
        Opcode::AHQ_K,
        Opcode::DSB_K,
        Opcode::DSQ_K,
        Opcode::AF_K,
        Opcode::AT_K,
        Opcode::VHQ1_V,
        Opcode::VHQ2_V,
        Opcode::VH_V,
        Opcode::AF_V,
        Opcode::AT_V,
    ];

    /// Look an opcode up by its 6-bit wire value.
    pub fn from_wire(value: u8) -> Option<Opcode> {
        Opcode::ALL.get(value as usize).copied()
    }

    /// Human-readable name of the opcode.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::EM_R => "EM(R) Einbuchen",
            Opcode::UM_R => "UM(R) Umbuchen",
            Opcode::VWG_R => "VWG(R) Verbindungswunsch gehend",
            Opcode::SRG_R => "SRG(R) Sofortruf gehend",
            Opcode::LR_R => "LR(R) Leerruf",
            Opcode::EBQ_R => "EBQ(R) Einbuchquittung",
            Opcode::UBQ_R => "UBQ(R) Umbuchquittung",
            Opcode::WBP_R => "WBP(R) Wahlbestaetigung positiv",
            Opcode::WBN_R => "WBN(R) Wahlbestaetigung negativ",
            Opcode::VAG_R => "VAG(R) Verbindungsaufbau gehend",
            Opcode::VAK_R => "VAK(R) Verbindungsaufbau kommend",
            Opcode::MLR_M => "MLR(M) Meldeleerruf",
            Opcode::WAF_M => "WAF(M) Wahlaufforderung",
            Opcode::WUE_M => "WUE(M) Wahluebertragung",
            Opcode::BEL_K => "BEL(K) Belegung",
            Opcode::BQ_K => "BQ(K) Belegungsquittung",
            Opcode::VHQ_K => "VHQ(K) Quittung Verbindung halten",
            Opcode::VH_K => "VH(K) Verbindung halten",
            Opcode::RTA_K => "RTA(K) Rufton anschalten",
            Opcode::RTAQ_K => "RTAQ(K) Rufton anschalten Quittung",
            Opcode::AH_K => "AH(K) Abheben",
            Opcode::AHQ_K => "AHQ(K) Abhebequittung",
            Opcode::DSB_K => "DSB(K) Durchschalten",
            Opcode::DSQ_K => "DSQ(K) Durchschaltung Quittung",
            Opcode::AF_K => "AF(K) Ausloesen durch FuFSt",
            Opcode::AT_K => "AT(K) Ausloesen durch FuTln",
            Opcode::VHQ1_V => "VHQ1(V) Quittung Verbindung halten 1",
            Opcode::VHQ2_V => "VHQ2(V) Quittung Verbindung halten 2",
            Opcode::VH_V => "VH(V) Verbindung halten",
            Opcode::AF_V => "AF(V) Ausloesen durch FuFSt",
            Opcode::AT_V => "AT(V) Ausloesen durch FuTln",
        }
    }

    /// Block class the opcode is valid on.
    pub fn block_class(self) -> BlockClass {
        use Opcode::*;
        match self {
            EM_R | UM_R | VWG_R | SRG_R | LR_R | EBQ_R | UBQ_R | WBP_R | WBN_R | VAG_R
            | VAK_R => BlockClass::OgkRufblock,
            MLR_M | WAF_M | WUE_M => BlockClass::OgkMeldeblock,
            BEL_K | BQ_K | VHQ_K | VH_K | RTA_K | RTAQ_K | AH_K | AHQ_K | DSB_K | DSQ_K
            | AF_K | AT_K => BlockClass::SpkConcentrated,
            VHQ1_V | VHQ2_V | VH_V | AF_V | AT_V => BlockClass::SpkDistributed,
        }
    }

    /// Direction the opcode travels in.
    pub fn direction(self) -> Direction {
        use Opcode::*;
        match self {
            EM_R | UM_R | VWG_R | SRG_R | WUE_M | BEL_K | VH_K | RTAQ_K | AH_K | DSQ_K
            | AT_K | VH_V | AT_V => Direction::Uplink,
            _ => Direction::Downlink,
        }
    }
}

// =======================================================================
// Telegram
// =======================================================================

/// One decoded block's worth of named fields.
///
/// Fields not carried by the telegram's opcode keep their zero default,
/// mirroring the original's cleared scratch record. Field names follow the
/// air-interface terminology.
#[derive(Debug, Clone, PartialEq)]
pub struct Telegramm {
    pub opcode: Opcode,
    pub futln_nationalitaet: u8,
    pub futln_heimat_fuvst_nr: u8,
    pub futln_rest_nr: u16,
    pub fuz_nationalitaet: u8,
    pub fuz_fuvst_nr: u8,
    pub fuz_rest_nr: u8,
    pub frequenz_nr: u16,
    pub zeitschlitz_nr: u8,
    pub max_sendeleistung: u8,
    pub bedingte_genauigkeit_der_fufst: u8,
    pub grenzwert_fuer_einbuchen_und_umbuchen: u8,
    pub authentifikationsbit: u8,
    pub vermittlungstechnische_sperren: u8,
    pub ws_kennung: u8,
    pub reduzierungsfaktor: u8,
    pub kennung_fufst: u8,
    pub nachbarschafts_prioritaets_bit: u8,
    pub bewertung_nach_pegel_und_entfernung: u8,
    pub entfernungsangabe_der_fufst: u8,
    pub mittelungsfaktor_fuer_ausloesen: u8,
    pub mittelungsfaktor_fuer_umschalten: u8,
    pub grenzwert_fuer_umschalten: u8,
    pub grenze_fuer_ausloesen: u8,
    pub ogk_verkehrsanteil: u8,
    pub teilnehmersperre: u8,
    pub anzahl_gesperrter_teilnehmergruppen: u8,
    pub ogk_vorschlag: u16,
    pub sendeleistungsanpassung: u8,
    pub entfernung: u8,
    pub ankuendigung_gespraechsende: u8,
    pub gebuehren_stand: u16,
    pub gueltigkeit_des_gebuehrenstandes: u8,
    pub ausloesegrund: u8,
    pub betriebs_art: u8,
    pub chipkarten_futelg_bit: u8,
    pub sicherungs_code: u16,
    pub kartenkennung: u8,
    pub herstellerkennung: u8,
    pub hardware_des_futelg: u8,
    pub software_des_futelg: u8,
    /// Dialed digits of a `WUE(M)` telegram, max 15.
    pub wahlziffern: String,
    /// RX metadata: fractional sync position in bits, filled by the
    /// demodulator, never transmitted.
    pub sync_time: f64,
}

impl Default for Telegramm {
    fn default() -> Self {
        Self {
            opcode: Opcode::LR_R,
            futln_nationalitaet: 0,
            futln_heimat_fuvst_nr: 0,
            futln_rest_nr: 0,
            fuz_nationalitaet: 0,
            fuz_fuvst_nr: 0,
            fuz_rest_nr: 0,
            frequenz_nr: 0,
            zeitschlitz_nr: 0,
            max_sendeleistung: 0,
            bedingte_genauigkeit_der_fufst: 0,
            grenzwert_fuer_einbuchen_und_umbuchen: 0,
            authentifikationsbit: 0,
            vermittlungstechnische_sperren: 0,
            ws_kennung: 0,
            reduzierungsfaktor: 0,
            kennung_fufst: 0,
            nachbarschafts_prioritaets_bit: 0,
            bewertung_nach_pegel_und_entfernung: 0,
            entfernungsangabe_der_fufst: 0,
            mittelungsfaktor_fuer_ausloesen: 0,
            mittelungsfaktor_fuer_umschalten: 0,
            grenzwert_fuer_umschalten: 0,
            grenze_fuer_ausloesen: 0,
            ogk_verkehrsanteil: 0,
            teilnehmersperre: 0,
            anzahl_gesperrter_teilnehmergruppen: 0,
            ogk_vorschlag: 0,
            sendeleistungsanpassung: 0,
            entfernung: 0,
            ankuendigung_gespraechsende: 0,
            gebuehren_stand: 0,
            gueltigkeit_des_gebuehrenstandes: 0,
            ausloesegrund: 0,
            betriebs_art: 0,
            chipkarten_futelg_bit: 0,
            sicherungs_code: 0,
            kartenkennung: 0,
            herstellerkennung: 0,
            hardware_des_futelg: 0,
            software_des_futelg: 0,
            wahlziffern: String::new(),
            sync_time: 0.0,
        }
    }
}

impl Telegramm {
    /// Subscriber number of the telegram's mobile identity, e.g. "2222002".
    pub fn rufnummer(&self) -> String {
        format!(
            "{}{}{:05}",
            self.futln_nationalitaet, self.futln_heimat_fuvst_nr, self.futln_rest_nr
        )
    }
}

// =======================================================================
// Field tables
// =======================================================================

/// Payload fields, each with a fixed wire width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum F {
    FutlnNat,
    FutlnFuvst,
    FutlnRest,
    FuzNat,
    FuzFuvst,
    FuzRest,
    FrequenzNr,
    ZeitschlitzNr,
    MaxSendeleistung,
    BedingteGenauigkeit,
    GrenzwertEinbuchen,
    Authentifikationsbit,
    Sperren,
    WsKennung,
    Reduzierungsfaktor,
    KennungFufst,
    NachbarPrio,
    Bewertung,
    Entfernungsangabe,
    MittelAusloesen,
    MittelUmschalten,
    GrenzwertUmschalten,
    GrenzeAusloesen,
    OgkVerkehrsanteil,
    Teilnehmersperre,
    AnzahlGesperrter,
    OgkVorschlag,
    Sendeleistungsanpassung,
    Entfernung,
    Ankuendigung,
    GebuehrenStand,
    Gueltigkeit,
    Ausloesegrund,
    BetriebsArt,
    ChipkartenBit,
    SicherungsCode,
    Kartenkennung,
    Herstellerkennung,
    Hardware,
    Software,
}

impl F {
    fn width(self) -> u8 {
        match self {
            F::FutlnNat => 3,
            F::FutlnFuvst => 5,
            F::FutlnRest => 16,
            F::FuzNat => 3,
            F::FuzFuvst => 5,
            F::FuzRest => 5,
            F::FrequenzNr => 10,
            F::ZeitschlitzNr => 5,
            F::MaxSendeleistung => 2,
            F::BedingteGenauigkeit => 1,
            F::GrenzwertEinbuchen => 3,
            F::Authentifikationsbit => 1,
            F::Sperren => 2,
            F::WsKennung => 2,
            F::Reduzierungsfaktor => 2,
            F::KennungFufst => 2,
            F::NachbarPrio => 1,
            F::Bewertung => 1,
            F::Entfernungsangabe => 3,
            F::MittelAusloesen => 2,
            F::MittelUmschalten => 2,
            F::GrenzwertUmschalten => 2,
            F::GrenzeAusloesen => 3,
            F::OgkVerkehrsanteil => 2,
            F::Teilnehmersperre => 1,
            F::AnzahlGesperrter => 2,
            F::OgkVorschlag => 10,
            F::Sendeleistungsanpassung => 1,
            F::Entfernung => 3,
            F::Ankuendigung => 1,
            F::GebuehrenStand => 11,
            F::Gueltigkeit => 1,
            F::Ausloesegrund => 2,
            F::BetriebsArt => 1,
            F::ChipkartenBit => 1,
            F::SicherungsCode => 12,
            F::Kartenkennung => 5,
            F::Herstellerkennung => 3,
            F::Hardware => 3,
            F::Software => 3,
        }
    }
}

/// Idle broadcast on the rufblock ("Leerruf").
const FIELDS_LR: &[F] = &[
    F::MaxSendeleistung,
    F::BedingteGenauigkeit,
    F::ZeitschlitzNr,
    F::GrenzwertEinbuchen,
    F::Authentifikationsbit,
    F::Sperren,
    F::WsKennung,
    F::Reduzierungsfaktor,
    F::FuzNat,
    F::FuzFuvst,
    F::FuzRest,
    F::KennungFufst,
    F::NachbarPrio,
    F::Bewertung,
    F::Entfernungsangabe,
    F::MittelAusloesen,
    F::MittelUmschalten,
    F::GrenzwertUmschalten,
    F::GrenzeAusloesen,
];

/// Attach / roam request with card identification.
const FIELDS_EM: &[F] = &[
    F::FuzNat,
    F::FuzFuvst,
    F::FuzRest,
    F::FutlnNat,
    F::FutlnFuvst,
    F::FutlnRest,
    F::ChipkartenBit,
    F::SicherungsCode,
    F::Kartenkennung,
    F::Herstellerkennung,
    F::Hardware,
    F::Software,
];

/// Plain identity telegrams on the rufblock (requests and acknowledges).
const FIELDS_IDENT_R: &[F] = &[
    F::FuzNat,
    F::FuzFuvst,
    F::FuzRest,
    F::FutlnNat,
    F::FutlnFuvst,
    F::FutlnRest,
];

/// Channel assignment: identity plus target speech channel.
const FIELDS_VAG: &[F] = &[
    F::FuzNat,
    F::FuzFuvst,
    F::FuzRest,
    F::FutlnNat,
    F::FutlnFuvst,
    F::FutlnRest,
    F::FrequenzNr,
];

/// Idle broadcast on the meldeblock.
const FIELDS_MLR: &[F] = &[
    F::MaxSendeleistung,
    F::OgkVerkehrsanteil,
    F::Teilnehmersperre,
    F::AnzahlGesperrter,
    F::OgkVorschlag,
    F::FuzRest,
];

/// Dialing prompt: meldeblock broadcast plus the prompted identity.
const FIELDS_WAF: &[F] = &[
    F::MaxSendeleistung,
    F::OgkVerkehrsanteil,
    F::Teilnehmersperre,
    F::AnzahlGesperrter,
    F::OgkVorschlag,
    F::FuzRest,
    F::FutlnNat,
    F::FutlnFuvst,
    F::FutlnRest,
];

/// Uplink telegrams on the speech channel.
const FIELDS_UPLINK_SPK: &[F] = &[
    F::FuzNat,
    F::FuzFuvst,
    F::FuzRest,
    F::FutlnNat,
    F::FutlnFuvst,
    F::FutlnRest,
    F::BetriebsArt,
];

/// Downlink telegrams in concentrated signalling.
const FIELDS_DOWNLINK_K: &[F] = &[
    F::MaxSendeleistung,
    F::Sendeleistungsanpassung,
    F::Entfernung,
    F::BedingteGenauigkeit,
    F::FuzNat,
    F::FuzFuvst,
    F::FuzRest,
    F::FutlnNat,
    F::FutlnFuvst,
    F::FutlnRest,
    F::FrequenzNr,
];

/// Downlink telegrams in distributed signalling.
const FIELDS_DOWNLINK_V: &[F] = &[
    F::MaxSendeleistung,
    F::Sendeleistungsanpassung,
    F::Ankuendigung,
    F::GebuehrenStand,
    F::Gueltigkeit,
    F::FuzNat,
    F::FuzFuvst,
    F::FuzRest,
    F::FutlnNat,
    F::FutlnFuvst,
    F::FutlnRest,
    F::Entfernung,
    F::BedingteGenauigkeit,
    F::Ausloesegrund,
];

/// Maximum number of digits a `WUE(M)` telegram carries.
pub const MAX_WAHLZIFFERN: usize = 15;

fn fields_for(opcode: Opcode) -> &'static [F] {
    use Opcode::*;
    match opcode {
        LR_R => FIELDS_LR,
        EM_R | UM_R => FIELDS_EM,
        VWG_R | SRG_R | EBQ_R | UBQ_R | WBP_R | WBN_R => FIELDS_IDENT_R,
        VAG_R | VAK_R => FIELDS_VAG,
        MLR_M => FIELDS_MLR,
        WAF_M => FIELDS_WAF,
        WUE_M => &[], // digits, handled separately
        BEL_K | VH_K | RTAQ_K | AH_K | DSQ_K | AT_K => FIELDS_UPLINK_SPK,
        BQ_K | VHQ_K | RTA_K | AHQ_K | DSB_K | AF_K => FIELDS_DOWNLINK_K,
        VHQ1_V | VHQ2_V | AF_V => FIELDS_DOWNLINK_V,
        VH_V | AT_V => FIELDS_UPLINK_SPK,
    }
}

impl Telegramm {
    fn get(&self, f: F) -> u64 {
        match f {
            F::FutlnNat => u64::from(self.futln_nationalitaet),
            F::FutlnFuvst => u64::from(self.futln_heimat_fuvst_nr),
            F::FutlnRest => u64::from(self.futln_rest_nr),
            F::FuzNat => u64::from(self.fuz_nationalitaet),
            F::FuzFuvst => u64::from(self.fuz_fuvst_nr),
            F::FuzRest => u64::from(self.fuz_rest_nr),
            F::FrequenzNr => u64::from(self.frequenz_nr),
            F::ZeitschlitzNr => u64::from(self.zeitschlitz_nr),
            F::MaxSendeleistung => u64::from(self.max_sendeleistung),
            F::BedingteGenauigkeit => u64::from(self.bedingte_genauigkeit_der_fufst),
            F::GrenzwertEinbuchen => u64::from(self.grenzwert_fuer_einbuchen_und_umbuchen),
            F::Authentifikationsbit => u64::from(self.authentifikationsbit),
            F::Sperren => u64::from(self.vermittlungstechnische_sperren),
            F::WsKennung => u64::from(self.ws_kennung),
            F::Reduzierungsfaktor => u64::from(self.reduzierungsfaktor),
            F::KennungFufst => u64::from(self.kennung_fufst),
            F::NachbarPrio => u64::from(self.nachbarschafts_prioritaets_bit),
            F::Bewertung => u64::from(self.bewertung_nach_pegel_und_entfernung),
            F::Entfernungsangabe => u64::from(self.entfernungsangabe_der_fufst),
            F::MittelAusloesen => u64::from(self.mittelungsfaktor_fuer_ausloesen),
            F::MittelUmschalten => u64::from(self.mittelungsfaktor_fuer_umschalten),
            F::GrenzwertUmschalten => u64::from(self.grenzwert_fuer_umschalten),
            F::GrenzeAusloesen => u64::from(self.grenze_fuer_ausloesen),
            F::OgkVerkehrsanteil => u64::from(self.ogk_verkehrsanteil),
            F::Teilnehmersperre => u64::from(self.teilnehmersperre),
            F::AnzahlGesperrter => u64::from(self.anzahl_gesperrter_teilnehmergruppen),
            F::OgkVorschlag => u64::from(self.ogk_vorschlag),
            F::Sendeleistungsanpassung => u64::from(self.sendeleistungsanpassung),
            F::Entfernung => u64::from(self.entfernung),
            F::Ankuendigung => u64::from(self.ankuendigung_gespraechsende),
            F::GebuehrenStand => u64::from(self.gebuehren_stand),
            F::Gueltigkeit => u64::from(self.gueltigkeit_des_gebuehrenstandes),
            F::Ausloesegrund => u64::from(self.ausloesegrund),
            F::BetriebsArt => u64::from(self.betriebs_art),
            F::ChipkartenBit => u64::from(self.chipkarten_futelg_bit),
            F::SicherungsCode => u64::from(self.sicherungs_code),
            F::Kartenkennung => u64::from(self.kartenkennung),
            F::Herstellerkennung => u64::from(self.herstellerkennung),
            F::Hardware => u64::from(self.hardware_des_futelg),
            F::Software => u64::from(self.software_des_futelg),
        }
    }

    fn set(&mut self, f: F, v: u64) {
        match f {
            F::FutlnNat => self.futln_nationalitaet = v as u8,
            F::FutlnFuvst => self.futln_heimat_fuvst_nr = v as u8,
            F::FutlnRest => self.futln_rest_nr = v as u16,
            F::FuzNat => self.fuz_nationalitaet = v as u8,
            F::FuzFuvst => self.fuz_fuvst_nr = v as u8,
            F::FuzRest => self.fuz_rest_nr = v as u8,
            F::FrequenzNr => self.frequenz_nr = v as u16,
            F::ZeitschlitzNr => self.zeitschlitz_nr = v as u8,
            F::MaxSendeleistung => self.max_sendeleistung = v as u8,
            F::BedingteGenauigkeit => self.bedingte_genauigkeit_der_fufst = v as u8,
            F::GrenzwertEinbuchen => self.grenzwert_fuer_einbuchen_und_umbuchen = v as u8,
            F::Authentifikationsbit => self.authentifikationsbit = v as u8,
            F::Sperren => self.vermittlungstechnische_sperren = v as u8,
            F::WsKennung => self.ws_kennung = v as u8,
            F::Reduzierungsfaktor => self.reduzierungsfaktor = v as u8,
            F::KennungFufst => self.kennung_fufst = v as u8,
            F::NachbarPrio => self.nachbarschafts_prioritaets_bit = v as u8,
            F::Bewertung => self.bewertung_nach_pegel_und_entfernung = v as u8,
            F::Entfernungsangabe => self.entfernungsangabe_der_fufst = v as u8,
            F::MittelAusloesen => self.mittelungsfaktor_fuer_ausloesen = v as u8,
            F::MittelUmschalten => self.mittelungsfaktor_fuer_umschalten = v as u8,
            F::GrenzwertUmschalten => self.grenzwert_fuer_umschalten = v as u8,
            F::GrenzeAusloesen => self.grenze_fuer_ausloesen = v as u8,
            F::OgkVerkehrsanteil => self.ogk_verkehrsanteil = v as u8,
            F::Teilnehmersperre => self.teilnehmersperre = v as u8,
            F::AnzahlGesperrter => self.anzahl_gesperrter_teilnehmergruppen = v as u8,
            F::OgkVorschlag => self.ogk_vorschlag = v as u16,
            F::Sendeleistungsanpassung => self.sendeleistungsanpassung = v as u8,
            F::Entfernung => self.entfernung = v as u8,
            F::Ankuendigung => self.ankuendigung_gespraechsende = v as u8,
            F::GebuehrenStand => self.gebuehren_stand = v as u16,
            F::Gueltigkeit => self.gueltigkeit_des_gebuehrenstandes = v as u8,
            F::Ausloesegrund => self.ausloesegrund = v as u8,
            F::BetriebsArt => self.betriebs_art = v as u8,
            F::ChipkartenBit => self.chipkarten_futelg_bit = v as u8,
            F::SicherungsCode => self.sicherungs_code = v as u16,
            F::Kartenkennung => self.kartenkennung = v as u8,
            F::Herstellerkennung => self.herstellerkennung = v as u8,
            F::Hardware => self.hardware_des_futelg = v as u8,
            F::Software => self.software_des_futelg = v as u8,
        }
    }
}

// =======================================================================
// Bit-level helpers
// =======================================================================

struct BitWriter<'a> {
    bits: &'a mut [u8],
    pos: usize,
}

impl<'a> BitWriter<'a> {
    fn new(bits: &'a mut [u8]) -> Self {
        Self { bits, pos: 0 }
    }

    /// Append `width` bits of `value`, MSB first.
    fn put(&mut self, value: u64, width: u8) {
        for i in (0..width).rev() {
            self.bits[self.pos] = ((value >> i) & 1) as u8;
            self.pos += 1;
        }
    }
}

struct BitReader<'a> {
    bits: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bits: &'a [u8]) -> Self {
        Self { bits, pos: 0 }
    }

    fn take(&mut self, width: u8) -> u64 {
        let mut v = 0u64;
        for _ in 0..width {
            v = (v << 1) | u64::from(self.bits[self.pos] & 1);
            self.pos += 1;
        }
        v
    }
}

// =======================================================================
// Codec
// =======================================================================

/// Telegram decode failure. Failures are logged at notice level and the
/// block is discarded; they never escalate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegrammError {
    /// Barker sequence did not match.
    SyncMismatch,
    /// Even-parity trailer mismatch.
    ParityError,
    /// BCH syndrome of the given codeword index is non-zero.
    CodewordError(usize),
    /// Opcode value outside the catalogue.
    UnknownOpcode(u8),
}

impl std::fmt::Display for TelegrammError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelegrammError::SyncMismatch => write!(f, "barker sync mismatch"),
            TelegrammError::ParityError => write!(f, "parity error"),
            TelegrammError::CodewordError(i) => write!(f, "BCH error in codeword {}", i),
            TelegrammError::UnknownOpcode(op) => write!(f, "unknown opcode {}", op),
        }
    }
}

impl std::error::Error for TelegrammError {}

/// Encode a telegram into the 184 data bits of one block.
///
/// Digits beyond [`MAX_WAHLZIFFERN`] and non-digit characters are silently
/// dropped, matching the tolerant behaviour of the dialing path.
pub fn encode(telegramm: &Telegramm) -> [u8; TELEGRAMM_BITS] {
    // 1. Pack the 70 information bits.
    let mut info = [0u8; INFO_BITS];
    {
        let mut w = BitWriter::new(&mut info);
        w.put(u64::from(telegramm.opcode as u8), 6);
        if telegramm.opcode == Opcode::WUE_M {
            let digits: Vec<u8> = telegramm
                .wahlziffern
                .bytes()
                .filter(u8::is_ascii_digit)
                .map(|d| d - b'0')
                .take(MAX_WAHLZIFFERN)
                .collect();
            w.put(digits.len() as u64, 4);
            for &d in &digits {
                w.put(u64::from(d), 4);
            }
        } else {
            for &f in fields_for(telegramm.opcode) {
                let width = f.width();
                let mask = (1u64 << width) - 1;
                w.put(telegramm.get(f) & mask, width);
            }
        }
    }

    // 2. BCH-encode ten 7-bit groups and interleave column-wise.
    let mut coded = [0u8; CODEWORDS * bch::CODE_BITS];
    for (i, group) in info.chunks(bch::DATA_BITS).enumerate() {
        let mut data = 0u8;
        for &bit in group {
            data = (data << 1) | bit;
        }
        let cw = bch::encode(data);
        for j in 0..bch::CODE_BITS {
            let bit = ((cw >> (bch::CODE_BITS - 1 - j)) & 1) as u8;
            coded[j * CODEWORDS + i] = bit;
        }
    }

    // 3. Assemble run-in + barker + payload + parity.
    let mut bits = [0u8; TELEGRAMM_BITS];
    let mut parity = 0u8;
    {
        let mut w = BitWriter::new(&mut bits);
        for i in 0..RUN_IN_BITS {
            w.put(u64::from((i & 1) == 0), 1);
        }
        for &b in &BARKER {
            w.put(u64::from(b), 1);
        }
        for &b in &coded {
            w.put(u64::from(b), 1);
            parity ^= b;
        }
        w.put(u64::from(parity), 1);
    }
    bits
}

/// Decode 184 received data bits into a telegram.
pub fn decode(bits: &[u8; TELEGRAMM_BITS]) -> Result<Telegramm, TelegrammError> {
    let mut r = BitReader::new(bits);

    // Run-in carries no information; the demodulator locked on it already.
    let _ = r.take(RUN_IN_BITS as u8);
    for &b in &BARKER {
        if r.take(1) as u8 != b {
            return Err(TelegrammError::SyncMismatch);
        }
    }

    let mut coded = [0u8; CODEWORDS * bch::CODE_BITS];
    let mut parity = 0u8;
    for b in coded.iter_mut() {
        *b = r.take(1) as u8;
        parity ^= *b;
    }
    if r.take(1) as u8 != parity {
        return Err(TelegrammError::ParityError);
    }

    // De-interleave and check each codeword.
    let mut info = [0u8; INFO_BITS];
    for i in 0..CODEWORDS {
        let mut cw = 0u16;
        for j in 0..bch::CODE_BITS {
            cw = (cw << 1) | u16::from(coded[j * CODEWORDS + i]);
        }
        if !bch::check(cw) {
            return Err(TelegrammError::CodewordError(i));
        }
        let data = bch::data(cw);
        for k in 0..bch::DATA_BITS {
            info[i * bch::DATA_BITS + k] = (data >> (bch::DATA_BITS - 1 - k)) & 1;
        }
    }

    let mut r = BitReader::new(&info);
    let wire = r.take(6) as u8;
    let opcode = Opcode::from_wire(wire).ok_or(TelegrammError::UnknownOpcode(wire))?;

    let mut telegramm = Telegramm {
        opcode,
        ..Telegramm::default()
    };
    if opcode == Opcode::WUE_M {
        let count = r.take(4) as usize;
        let mut digits = String::new();
        for _ in 0..count.min(MAX_WAHLZIFFERN) {
            let d = (r.take(4) as u8).min(9);
            digits.push(char::from(b'0' + d));
        }
        telegramm.wahlziffern = digits;
    } else {
        for &f in fields_for(opcode) {
            let v = r.take(f.width());
            telegramm.set(f, v);
        }
    }

    Ok(telegramm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_telegramm(opcode: Opcode) -> Telegramm {
        let mut t = Telegramm {
            opcode,
            ..Telegramm::default()
        };
        // Fill every field the opcode carries with a width-respecting value.
        if opcode == Opcode::WUE_M {
            t.wahlziffern = "0101234567".to_string();
        } else {
            for (i, &f) in fields_for(opcode).iter().enumerate() {
                let mask = (1u64 << f.width()) - 1;
                t.set(f, (0x5A5A_5A5Au64 >> i) & mask);
            }
        }
        t
    }

    #[test]
    fn test_roundtrip_every_opcode() {
        for &opcode in &Opcode::ALL {
            let t = sample_telegramm(opcode);
            let bits = encode(&t);
            let decoded = decode(&bits).expect("valid block must decode");
            assert_eq!(decoded, t, "roundtrip mismatch for {}", opcode.name());
        }
    }

    #[test]
    fn test_single_bit_flip_rejected() {
        let t = sample_telegramm(Opcode::VAG_R);
        let bits = encode(&t);
        // Any flip in the coded payload or parity must be rejected.
        for pos in (RUN_IN_BITS + BARKER.len())..TELEGRAMM_BITS {
            let mut corrupted = bits;
            corrupted[pos] ^= 1;
            assert!(
                decode(&corrupted).is_err(),
                "flip at bit {} went undetected",
                pos
            );
        }
    }

    #[test]
    fn test_barker_flip_rejected() {
        let t = sample_telegramm(Opcode::LR_R);
        let bits = encode(&t);
        let mut corrupted = bits;
        corrupted[RUN_IN_BITS] ^= 1;
        assert_eq!(decode(&corrupted), Err(TelegrammError::SyncMismatch));
    }

    #[test]
    fn test_dial_digit_limit() {
        let t = Telegramm {
            opcode: Opcode::WUE_M,
            wahlziffern: "0123456789012345678".to_string(), // 19 digits
            ..Telegramm::default()
        };
        let decoded = decode(&encode(&t)).expect("decode");
        assert_eq!(decoded.wahlziffern, "012345678901234"); // truncated to 15
    }

    #[test]
    fn test_opcode_classes() {
        assert_eq!(Opcode::EM_R.block_class(), BlockClass::OgkRufblock);
        assert_eq!(Opcode::WUE_M.block_class(), BlockClass::OgkMeldeblock);
        assert_eq!(Opcode::BQ_K.block_class(), BlockClass::SpkConcentrated);
        assert_eq!(Opcode::VHQ1_V.block_class(), BlockClass::SpkDistributed);
        assert_eq!(Opcode::EM_R.direction(), Direction::Uplink);
        assert_eq!(Opcode::VAG_R.direction(), Direction::Downlink);
    }

    #[test]
    fn test_rufnummer_format() {
        let t = Telegramm {
            futln_nationalitaet: 2,
            futln_heimat_fuvst_nr: 2,
            futln_rest_nr: 22002,
            ..Telegramm::default()
        };
        assert_eq!(t.rufnummer(), "2222002");
    }
}
