// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-width OUCH message layouts and their per-version lengths.
//!
//! OUCH 5.0 appends a handful of fields to several 4.2 messages
//! (origination metadata, extra liquidity flags); the layouts below
//! model that as a version-conditional trailing appendage on top of
//! a shared 4.2 prefix, rather than two unrelated structs, since the
//! leading fields are byte-for-byte identical between versions.

use crate::buf::{BufResult, ByteBuf, ByteBufMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OuchVersion {
    V42,
    V50,
}

/// Total on-wire length (including the 1-byte message type) of
/// `msg_type` under `version`, or `None` if this crate does not
/// recognize the type. Indexed as a small match rather than an array
/// so the table stays readable without a magic offset-by-ASCII-value
/// scheme.
pub const fn message_length(version: OuchVersion, msg_type: u8) -> Option<usize> {
    let v50_extra = match version {
        OuchVersion::V42 => 0,
        OuchVersion::V50 => 8,
    };
    match msg_type {
        b'O' => Some(49 + v50_extra), // Enter Order
        b'U' => Some(39 + v50_extra), // Replace Order
        b'X' => Some(19),             // Cancel Order (no appendage in either version)
        b'A' => Some(66 + v50_extra), // Order Accepted
        b'C' => Some(28),             // Order Canceled
        b'E' => Some(32 + v50_extra), // Order Executed
        b'J' => Some(51),             // Order Rejected
        b'S' => Some(10),             // System Event
        b'B' => Some(39),             // Broken Trade
        b'D' => Some(27),             // AIQ Canceled / Cancel Pending
        _ => None,
    }
}

/// Order token width, shared by every message that references one.
pub const ORDER_TOKEN_LEN: usize = 14;
pub const STOCK_SYMBOL_LEN: usize = 8;
pub const FIRM_LEN: usize = 4;

macro_rules! ascii_field {
    ($get:ident, $offset:expr, $len:expr) => {
        pub fn $get(&self) -> BufResult<&str> {
            self.0.get_ascii($offset, $len)
        }
    };
}

macro_rules! ascii_field_mut {
    ($get:ident, $put:ident, $offset:expr, $len:expr) => {
        pub fn $get(&self) -> BufResult<&str> {
            self.0.as_byte_buf().get_ascii($offset, $len)
        }
        pub fn $put(&mut self, value: &str) -> BufResult<()> {
            let mut padded = [b' '; $len];
            let bytes = value.as_bytes();
            let n = bytes.len().min($len);
            padded[..n].copy_from_slice(&bytes[..n]);
            self.0.put_slice($offset, &padded)
        }
    };
}

/// Client -> server: enter a new order (spec §4.6, message type `O`).
pub struct EnterOrder<'a>(ByteBuf<'a>);

impl<'a> EnterOrder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(ByteBuf::new(data))
    }

    pub fn msg_type(&self) -> BufResult<u8> {
        self.0.get_u8(0)
    }
    ascii_field!(order_token, 1, ORDER_TOKEN_LEN);
    pub fn buy_sell_indicator(&self) -> BufResult<u8> {
        self.0.get_u8(15)
    }
    pub fn shares(&self) -> BufResult<u32> {
        self.0.get_u32_be(16)
    }
    ascii_field!(stock, 20, STOCK_SYMBOL_LEN);
    /// Price in 1/10000ths of the quote currency (standard OUCH
    /// fixed-point price encoding).
    pub fn price(&self) -> BufResult<u32> {
        self.0.get_u32_be(28)
    }
    pub fn time_in_force(&self) -> BufResult<u32> {
        self.0.get_u32_be(32)
    }
    ascii_field!(firm, 36, FIRM_LEN);
    pub fn display(&self) -> BufResult<u8> {
        self.0.get_u8(40)
    }
    pub fn capacity(&self) -> BufResult<u8> {
        self.0.get_u8(41)
    }
    pub fn intermarket_sweep(&self) -> BufResult<u8> {
        self.0.get_u8(42)
    }
    pub fn minimum_quantity(&self) -> BufResult<u32> {
        self.0.get_u32_be(43)
    }
    pub fn cross_type(&self) -> BufResult<u8> {
        self.0.get_u8(47)
    }
    pub fn customer_type(&self) -> BufResult<u8> {
        self.0.get_u8(48)
    }
}

pub struct EnterOrderMut<'a>(ByteBufMut<'a>);

impl<'a> EnterOrderMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self(ByteBufMut::new(data))
    }

    pub fn set_msg_type(&mut self) -> BufResult<()> {
        self.0.put_u8(0, b'O')
    }
    ascii_field_mut!(order_token, set_order_token, 1, ORDER_TOKEN_LEN);
    pub fn set_buy_sell_indicator(&mut self, value: u8) -> BufResult<()> {
        self.0.put_u8(15, value)
    }
    pub fn set_shares(&mut self, value: u32) -> BufResult<()> {
        self.0.put_u32_be(16, value)
    }
    ascii_field_mut!(stock, set_stock, 20, STOCK_SYMBOL_LEN);
    pub fn set_price(&mut self, value: u32) -> BufResult<()> {
        self.0.put_u32_be(28, value)
    }
    pub fn set_time_in_force(&mut self, value: u32) -> BufResult<()> {
        self.0.put_u32_be(32, value)
    }
    ascii_field_mut!(firm, set_firm, 36, FIRM_LEN);
    pub fn set_display(&mut self, value: u8) -> BufResult<()> {
        self.0.put_u8(40, value)
    }
    pub fn set_capacity(&mut self, value: u8) -> BufResult<()> {
        self.0.put_u8(41, value)
    }
    pub fn set_intermarket_sweep(&mut self, value: u8) -> BufResult<()> {
        self.0.put_u8(42, value)
    }
    pub fn set_minimum_quantity(&mut self, value: u32) -> BufResult<()> {
        self.0.put_u32_be(43, value)
    }
    pub fn set_cross_type(&mut self, value: u8) -> BufResult<()> {
        self.0.put_u8(47, value)
    }
    pub fn set_customer_type(&mut self, value: u8) -> BufResult<()> {
        self.0.put_u8(48, value)
    }
}

/// Client -> server: cancel an existing order (message type `X`).
pub struct CancelOrder<'a>(ByteBuf<'a>);

impl<'a> CancelOrder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(ByteBuf::new(data))
    }
    pub fn msg_type(&self) -> BufResult<u8> {
        self.0.get_u8(0)
    }
    ascii_field!(order_token, 1, ORDER_TOKEN_LEN);
    pub fn shares(&self) -> BufResult<u32> {
        self.0.get_u32_be(15)
    }
}

pub struct CancelOrderMut<'a>(ByteBufMut<'a>);

impl<'a> CancelOrderMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self(ByteBufMut::new(data))
    }
    pub fn set_msg_type(&mut self) -> BufResult<()> {
        self.0.put_u8(0, b'X')
    }
    ascii_field_mut!(order_token, set_order_token, 1, ORDER_TOKEN_LEN);
    pub fn set_shares(&mut self, value: u32) -> BufResult<()> {
        self.0.put_u32_be(15, value)
    }
}

/// Server -> client: order accepted (message type `A`).
pub struct OrderAccepted<'a>(ByteBuf<'a>);

impl<'a> OrderAccepted<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(ByteBuf::new(data))
    }
    pub fn msg_type(&self) -> BufResult<u8> {
        self.0.get_u8(0)
    }
    pub fn timestamp_ns(&self) -> BufResult<u64> {
        self.0.get_u64_be(1)
    }
    ascii_field!(order_token, 9, ORDER_TOKEN_LEN);
    pub fn order_reference_number(&self) -> BufResult<u64> {
        self.0.get_u64_be(23)
    }
}

pub struct OrderAcceptedMut<'a>(ByteBufMut<'a>);

impl<'a> OrderAcceptedMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self(ByteBufMut::new(data))
    }
    pub fn set_msg_type(&mut self) -> BufResult<()> {
        self.0.put_u8(0, b'A')
    }
    pub fn set_timestamp_ns(&mut self, value: u64) -> BufResult<()> {
        self.0.put_u64_be(1, value)
    }
    ascii_field_mut!(order_token, set_order_token, 9, ORDER_TOKEN_LEN);
    pub fn set_order_reference_number(&mut self, value: u64) -> BufResult<()> {
        self.0.put_u64_be(23, value)
    }
}

/// Server -> client: execution report (message type `E`).
pub struct OrderExecuted<'a>(ByteBuf<'a>);

impl<'a> OrderExecuted<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self(ByteBuf::new(data))
    }
    pub fn msg_type(&self) -> BufResult<u8> {
        self.0.get_u8(0)
    }
    pub fn timestamp_ns(&self) -> BufResult<u64> {
        self.0.get_u64_be(1)
    }
    ascii_field!(order_token, 9, ORDER_TOKEN_LEN);
    pub fn executed_shares(&self) -> BufResult<u32> {
        self.0.get_u32_be(23)
    }
    pub fn execution_price(&self) -> BufResult<u32> {
        self.0.get_u32_be(27)
    }
}

pub struct OrderExecutedMut<'a>(ByteBufMut<'a>);

impl<'a> OrderExecutedMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self(ByteBufMut::new(data))
    }
    pub fn set_msg_type(&mut self) -> BufResult<()> {
        self.0.put_u8(0, b'E')
    }
    pub fn set_timestamp_ns(&mut self, value: u64) -> BufResult<()> {
        self.0.put_u64_be(1, value)
    }
    ascii_field_mut!(order_token, set_order_token, 9, ORDER_TOKEN_LEN);
    pub fn set_executed_shares(&mut self, value: u32) -> BufResult<()> {
        self.0.put_u32_be(23, value)
    }
    pub fn set_execution_price(&mut self, value: u32) -> BufResult<()> {
        self.0.put_u32_be(27, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_order_roundtrips_all_fields() {
        let mut buf = [0u8; 49];
        let mut w = EnterOrderMut::new(&mut buf);
        w.set_msg_type().unwrap();
        w.set_order_token("TOKEN0000001").unwrap();
        w.set_buy_sell_indicator(b'B').unwrap();
        w.set_shares(500).unwrap();
        w.set_stock("AAPL").unwrap();
        w.set_price(1_500_000).unwrap();
        w.set_time_in_force(99999).unwrap();
        w.set_firm("ABCD").unwrap();
        w.set_display(b'Y').unwrap();
        w.set_capacity(b'A').unwrap();
        w.set_intermarket_sweep(b'N').unwrap();
        w.set_minimum_quantity(0).unwrap();
        w.set_cross_type(b'N').unwrap();
        w.set_customer_type(b'R').unwrap();

        let r = EnterOrder::new(&buf);
        assert_eq!(r.msg_type().unwrap(), b'O');
        assert_eq!(r.order_token().unwrap().trim_end(), "TOKEN0000001");
        assert_eq!(r.shares().unwrap(), 500);
        assert_eq!(r.stock().unwrap().trim_end(), "AAPL");
        assert_eq!(r.price().unwrap(), 1_500_000);
        assert_eq!(r.firm().unwrap().trim_end(), "ABCD");
        assert_eq!(r.customer_type().unwrap(), b'R');
    }

    #[test]
    fn message_length_table_matches_version_deltas() {
        assert_eq!(message_length(OuchVersion::V42, b'O'), Some(49));
        assert_eq!(message_length(OuchVersion::V50, b'O'), Some(57));
        assert_eq!(message_length(OuchVersion::V42, b'X'), message_length(OuchVersion::V50, b'X'));
        assert_eq!(message_length(OuchVersion::V42, b'?'), None);
    }

    #[test]
    fn order_executed_roundtrips() {
        let mut buf = [0u8; 40];
        let mut w = OrderExecutedMut::new(&mut buf);
        w.set_msg_type().unwrap();
        w.set_timestamp_ns(123_456_789).unwrap();
        w.set_order_token("TOKEN0000002").unwrap();
        w.set_executed_shares(100).unwrap();
        w.set_execution_price(2_000_000).unwrap();

        let r = OrderExecuted::new(&buf);
        assert_eq!(r.msg_type().unwrap(), b'E');
        assert_eq!(r.timestamp_ns().unwrap(), 123_456_789);
        assert_eq!(r.executed_shares().unwrap(), 100);
        assert_eq!(r.execution_price().unwrap(), 2_000_000);
    }
}
