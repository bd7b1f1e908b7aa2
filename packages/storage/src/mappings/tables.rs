use services::types::{DateTime, L2Transaction, TxStatus, Utc};
use sqlx::types::BigDecimal;

macro_rules! bail {
    ($msg: literal, $($args: expr),*) => {
        return Err($crate::error::Error::Conversion(format!($msg, $($args),*)))
    };
}

#[derive(sqlx::FromRow)]
pub struct PoolTransaction {
    pub id: i64,
    pub hash: String,
    pub received_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub from_address: String,
    pub gas_price: BigDecimal,
    pub nonce: i64,
    pub status: String,
    pub ip: String,
    pub encoded: String,
    pub decoded: String,
    pub error: String,
}

impl TryFrom<PoolTransaction> for L2Transaction {
    type Error = crate::error::Error;

    fn try_from(value: PoolTransaction) -> Result<Self, Self::Error> {
        let Ok(id) = u64::try_from(value.id) else {
            bail!("Expected a non-negative `id`, but got: {} from db", value.id);
        };

        let Ok(status) = value.status.parse::<TxStatus>() else {
            bail!("Unknown `status` read from the db: {}", value.status);
        };

        let gas_price = bigdecimal_to_u64(&value.gas_price)?;

        let Ok(nonce) = u64::try_from(value.nonce) else {
            bail!(
                "Expected a non-negative `nonce`, but got: {} from db",
                value.nonce
            );
        };

        Ok(Self {
            id,
            hash: value.hash,
            received_at: value.received_at,
            from_address: value.from_address,
            gas_price,
            nonce,
            status,
            ip: value.ip,
            encoded: value.encoded,
            decoded: value.decoded,
        })
    }
}

// Assumes the value is a non-negative whole number, as enforced on write.
pub(crate) fn bigdecimal_to_u64(value: &BigDecimal) -> crate::error::Result<u64> {
    let (digits, scale) = value.clone().into_bigint_and_exponent();

    if scale > 0 {
        return Err(crate::error::Error::Conversion(format!(
            "Expected whole number, got fractional from db: {value}"
        )));
    }

    let result: u64 = digits
        .try_into()
        .map_err(|_| crate::error::Error::Conversion("Digits exceed u64 range".to_string()))?;

    Ok(result.saturating_mul(10u64.saturating_pow(scale.unsigned_abs() as u32)))
}

pub(crate) fn u64_to_bigdecimal(value: u64) -> BigDecimal {
    BigDecimal::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn given_row() -> PoolTransaction {
        PoolTransaction {
            id: 7,
            hash: "0x01".to_string(),
            received_at: Utc::now(),
            updated_at: Utc::now(),
            from_address: "0x000000000000000000000000000000000000dead".to_string(),
            gas_price: u64_to_bigdecimal(20_000_000_000),
            nonce: 9,
            status: "sent".to_string(),
            ip: "10.0.0.1".to_string(),
            encoded: "0xf86c".to_string(),
            decoded: "{}".to_string(),
            error: String::new(),
        }
    }

    #[test]
    fn converts_a_row_into_the_domain_transaction() {
        // given
        let row = given_row();
        let received_at = row.received_at;

        // when
        let tx = L2Transaction::try_from(row).unwrap();

        // then
        assert_eq!(tx.id, 7);
        assert_eq!(tx.status, TxStatus::Sent);
        assert_eq!(tx.gas_price, 20_000_000_000);
        assert_eq!(tx.nonce, 9);
        assert_eq!(tx.received_at, received_at);
        assert_eq!(tx.ip, "10.0.0.1");
    }

    #[test]
    fn rejects_an_unknown_status() {
        // given
        let mut row = given_row();
        row.status = "selected".to_string();

        // when
        let result = L2Transaction::try_from(row);

        // then
        let err = result.unwrap_err();
        assert!(err.to_string().contains("selected"));
    }

    #[test]
    fn rejects_a_negative_id() {
        // given
        let mut row = given_row();
        row.id = -1;

        // when
        let result = L2Transaction::try_from(row);

        // then
        assert!(result.is_err());
    }

    #[test]
    fn rejects_a_fractional_gas_price() {
        // given
        let value: BigDecimal = "1.5".parse().unwrap();

        // when
        let result = bigdecimal_to_u64(&value);

        // then
        assert!(result.is_err());
    }

    #[test]
    fn expands_scientific_notation_gas_prices() {
        // given
        let value: BigDecimal = "5e2".parse().unwrap();

        // when
        let result = bigdecimal_to_u64(&value).unwrap();

        // then
        assert_eq!(result, 500);
    }

    #[test]
    fn gas_price_survives_the_db_representation() {
        // given
        let original = u64::MAX;

        // when
        let round_tripped = bigdecimal_to_u64(&u64_to_bigdecimal(original)).unwrap();

        // then
        assert_eq!(round_tripped, original);
    }
}
