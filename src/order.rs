//! Core order aggregate, line items and negotiation actors
use crate::discount::{CartDiscount, LineAdjustment};
use crate::error::NegotiationError;
use crate::revision::Revision;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

/// Line numbers advance in steps of ten so a revision can splice new lines
/// between existing ones without renumbering the order.
pub const LINE_NUMBER_STEP: u32 = 10;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// CBOR codec for monetary amounts. Decimals round-trip through their exact
/// string form; binary mantissa/scale layouts differ between rust_decimal
/// versions and would silently corrupt stored orders.
pub(crate) mod dec {
    use rust_decimal::Decimal;

    pub fn encode<Ctx, W: minicbor::encode::Write>(
        v: &Decimal,
        e: &mut minicbor::Encoder<W>,
        _: &mut Ctx,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&v.to_string())?.ok()
    }

    pub fn decode<'b, Ctx>(
        d: &mut minicbor::Decoder<'b>,
        _: &mut Ctx,
    ) -> Result<Decimal, minicbor::decode::Error> {
        let raw = d.str()?;
        raw.parse()
            .map_err(|_| minicbor::decode::Error::message("failed to parse decimal amount"))
    }
}

/// Which side of the negotiation an actor speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ActorRole {
    #[n(0)]
    Sales,
    #[n(1)]
    Customer,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Sales => "sales",
            ActorRole::Customer => "customer",
        }
    }
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: String,
    pub actor_name: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(actor_id: String, actor_name: String, role: ActorRole) -> Self {
        Self {
            actor_id,
            actor_name,
            role,
        }
    }
    pub fn sales(actor_id: impl Into<String>, actor_name: impl Into<String>) -> Self {
        Self::new(actor_id.into(), actor_name.into(), ActorRole::Sales)
    }
    pub fn customer(actor_id: impl Into<String>, actor_name: impl Into<String>) -> Self {
        Self::new(actor_id.into(), actor_name.into(), ActorRole::Customer)
    }
}

/// Quotation lifecycle status.
///
/// `Confirmed` and `Cancelled` are owned by the surrounding commerce layer;
/// they are respected as terminal boundaries here but never produced by this
/// engine. `PendingQuotation` is a deployment alias the front-end may hand us
/// for an order that has not been quoted yet; it gates exactly like `Draft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum OrderStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    PendingQuotation,
    #[n(2)]
    QuotationSent,
    #[n(3)]
    Accepted,
    #[n(4)]
    Rejected,
    #[n(5)]
    Confirmed,
    #[n(6)]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::PendingQuotation => "pending_quotation",
            OrderStatus::QuotationSent => "quotation_sent",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states end the negotiation; no transition leaves them.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Accepted
                | OrderStatus::Rejected
                | OrderStatus::Confirmed
                | OrderStatus::Cancelled
        )
    }

    /// Whether discounts and adjustments may be applied outside a revision
    /// round. Once a quotation is out, money only moves through revisions.
    pub const fn allows_financial_mutation(&self) -> bool {
        matches!(self, OrderStatus::Draft | OrderStatus::PendingQuotation)
    }

    /// The legal transition map of the negotiation engine. A re-send after a
    /// revision keeps the order in `QuotationSent`, hence the self-loop.
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Draft, OrderStatus::QuotationSent)
                | (OrderStatus::PendingQuotation, OrderStatus::QuotationSent)
                | (OrderStatus::QuotationSent, OrderStatus::QuotationSent)
                | (OrderStatus::QuotationSent, OrderStatus::Accepted)
                | (OrderStatus::QuotationSent, OrderStatus::Rejected)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller payload for a line item; the engine assigns the line number and
/// owns every derived figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub sku: String,
    pub quantity: u32,
    pub list_price: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub is_gift_line: bool,
}

impl NewLineItem {
    pub fn new(
        sku: impl Into<String>,
        quantity: u32,
        list_price: Decimal,
        unit_price: Decimal,
        vat_rate: Decimal,
    ) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            list_price,
            unit_price,
            vat_rate,
            is_gift_line: false,
        }
    }
    pub fn gift(mut self) -> Self {
        self.is_gift_line = true;
        self
    }

    pub fn validate(&self) -> Result<(), NegotiationError> {
        if self.quantity == 0 {
            return Err(NegotiationError::InvalidLineItem(
                "quantity must be greater than zero".into(),
            ));
        }
        if self.list_price.is_sign_negative() || self.unit_price.is_sign_negative() {
            return Err(NegotiationError::InvalidLineItem(
                "prices must not be negative".into(),
            ));
        }
        if self.vat_rate.is_sign_negative() || self.vat_rate > Decimal::ONE_HUNDRED {
            return Err(NegotiationError::InvalidLineItem(
                "vat rate must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}

/// One priced product line. The `line_*` figures are derived by the
/// calculator and must never be written by anything else.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct LineItem {
    #[n(0)]
    pub line_number: u32,
    #[n(1)]
    pub sku: String,
    #[n(2)]
    pub quantity: u32,
    #[cbor(n(3), with = "crate::order::dec")]
    pub list_price: Decimal,
    #[cbor(n(4), with = "crate::order::dec")]
    pub unit_price: Decimal,
    #[cbor(n(5), with = "crate::order::dec")]
    pub vat_rate: Decimal,
    #[cbor(n(6), with = "crate::order::dec")]
    pub line_gross: Decimal,
    #[cbor(n(7), with = "crate::order::dec")]
    pub line_net: Decimal,
    #[cbor(n(8), with = "crate::order::dec")]
    pub line_vat: Decimal,
    #[cbor(n(9), with = "crate::order::dec")]
    pub line_total: Decimal,
    #[n(10)]
    pub discounts: Vec<LineAdjustment>,
    // Gift lines keep their derived figures for audit; the billing layer
    // decides whether they count towards the payable amount.
    #[n(11)]
    pub is_gift_line: bool,
}

impl LineItem {
    fn from_input(line_number: u32, input: NewLineItem) -> Self {
        Self {
            line_number,
            sku: input.sku,
            quantity: input.quantity,
            list_price: input.list_price,
            unit_price: input.unit_price,
            vat_rate: input.vat_rate,
            line_gross: Decimal::ZERO,
            line_net: Decimal::ZERO,
            line_vat: Decimal::ZERO,
            line_total: Decimal::ZERO,
            discounts: vec![],
            is_gift_line: input.is_gift_line,
        }
    }

    /// Effective discount against list price, as a percentage. Negative when
    /// the unit price exceeds list (a surcharged substitution).
    pub fn effective_discount_pct(&self) -> Decimal {
        if self.list_price.is_zero() {
            return Decimal::ZERO;
        }
        crate::calc::round2(
            (self.list_price - self.unit_price) / self.list_price * Decimal::ONE_HUNDRED,
        )
    }
}

/// The aggregate root for one commercial negotiation.
///
/// The five monetary totals are derived fields owned by the aggregator: they
/// equal the fold of `items` + `cart_discounts` + `shipping_cost` after every
/// mutating operation. `revisions` is append-only and never reordered.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Order {
    #[n(0)]
    pub order_id: String,
    #[n(1)]
    pub status: OrderStatus,
    #[n(2)]
    pub items: Vec<LineItem>,
    #[n(3)]
    pub cart_discounts: Vec<CartDiscount>,
    #[cbor(n(4), with = "crate::order::dec")]
    pub subtotal_gross: Decimal,
    #[cbor(n(5), with = "crate::order::dec")]
    pub subtotal_net: Decimal,
    #[cbor(n(6), with = "crate::order::dec")]
    pub total_vat: Decimal,
    #[cbor(n(7), with = "crate::order::dec")]
    pub total_discount: Decimal,
    #[cbor(n(8), with = "crate::order::dec")]
    pub shipping_cost: Decimal,
    #[cbor(n(9), with = "crate::order::dec")]
    pub order_total: Decimal,
    #[n(10)]
    pub revisions: Vec<Revision>,
    #[n(11)]
    pub rejection_reason: Option<String>,
    #[n(12)]
    pub created_at: TimeStamp<Utc>,
}

impl Order {
    /// A fresh draft with no lines and zeroed totals.
    pub fn draft(order_id: String) -> Self {
        Self {
            order_id,
            status: OrderStatus::Draft,
            items: vec![],
            cart_discounts: vec![],
            subtotal_gross: Decimal::ZERO,
            subtotal_net: Decimal::ZERO,
            total_vat: Decimal::ZERO,
            total_discount: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            order_total: Decimal::ZERO,
            revisions: vec![],
            rejection_reason: None,
            created_at: TimeStamp::new(),
        }
    }

    pub fn with_shipping_cost(mut self, shipping_cost: Decimal) -> Self {
        self.shipping_cost = shipping_cost;
        self
    }

    /// Next free line number: always `max + 10`, gaps left by deletions are
    /// never refilled. An empty order starts at 10.
    pub fn next_line_number(&self) -> u32 {
        self.items
            .iter()
            .map(|i| i.line_number)
            .max()
            .map_or(LINE_NUMBER_STEP, |max| max + LINE_NUMBER_STEP)
    }

    pub fn line(&self, line_number: u32) -> Option<&LineItem> {
        self.items.iter().find(|i| i.line_number == line_number)
    }

    pub(crate) fn line_mut(&mut self, line_number: u32) -> Option<&mut LineItem> {
        self.items.iter_mut().find(|i| i.line_number == line_number)
    }

    /// Validate and append a line item, assigning its line number. Totals are
    /// recomputed before returning.
    pub fn add_item(&mut self, input: NewLineItem) -> Result<u32, NegotiationError> {
        input.validate()?;
        let line_number = self.next_line_number();
        self.items.push(LineItem::from_input(line_number, input));
        crate::calc::recompute_totals(self);
        Ok(line_number)
    }

    pub fn remove_line(&mut self, line_number: u32) -> Result<LineItem, NegotiationError> {
        let idx = self
            .items
            .iter()
            .position(|i| i.line_number == line_number)
            .ok_or(NegotiationError::LineNotFound(line_number))?;
        let removed = self.items.remove(idx);
        crate::calc::recompute_totals(self);
        Ok(removed)
    }

    /// Change a line's quantity, returning the previous quantity.
    pub fn set_quantity(&mut self, line_number: u32, quantity: u32) -> Result<u32, NegotiationError> {
        if quantity == 0 {
            return Err(NegotiationError::InvalidLineItem(
                "quantity must be greater than zero".into(),
            ));
        }
        let item = self
            .line_mut(line_number)
            .ok_or(NegotiationError::LineNotFound(line_number))?;
        let old = item.quantity;
        item.quantity = quantity;
        crate::calc::recompute_totals(self);
        Ok(old)
    }

    /// CBOR-encode the current item set and hash it. The hash is the
    /// content address a revision's snapshot is stored under.
    pub fn snapshot_items(&self) -> Result<(String, Vec<u8>), NegotiationError> {
        let cbor = minicbor::to_vec(&self.items)
            .map_err(|e| NegotiationError::Internal(e.to_string()))?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}
