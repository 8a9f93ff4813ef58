//! Node operations on the store: read, write, list, remove and permissions.

use std::fmt::Display;
use std::str::FromStr;

use tracing::debug;

use super::NodePermission;
use super::Permission;
use super::Xenbus;
use crate::codec::nul_terminated;
use crate::codec::split_nul_terminated;
use crate::codec::MessageType;
use crate::codec::TransactionId;
use crate::constants::DEBUG_PRINT;
use crate::constants::DOMID_PATH;
use crate::ProtocolError;
use crate::RemoteError;
use crate::Result;

impl Xenbus {
    /// Reads the value stored at `path`. The bytes are returned exactly as
    /// the store holds them.
    ///
    /// # Errors
    /// - [`RemoteError::NotFound`] when `path` does not exist
    pub async fn read(
        &self,
        txn: TransactionId,
        path: &str,
    ) -> Result<Vec<u8>> {
        let reply = self
            .request(MessageType::Read, txn, &[nul_terminated(path).as_slice()])
            .await?;
        Ok(reply.payload)
    }

    /// [`Xenbus::read`] for values that are text.
    pub async fn read_string(
        &self,
        txn: TransactionId,
        path: &str,
    ) -> Result<String> {
        let bytes = self.read(txn, path).await?;
        String::from_utf8(bytes).map_err(|e| {
            ProtocolError::MalformedPayload(format!("value of {path} is not UTF-8: {e}")).into()
        })
    }

    /// Stores `value` at `path`, creating the node if needed.
    pub async fn write(
        &self,
        txn: TransactionId,
        path: &str,
        value: impl AsRef<[u8]>,
    ) -> Result<()> {
        self.request(
            MessageType::Write,
            txn,
            &[nul_terminated(path).as_slice(), value.as_ref()],
        )
        .await?;
        Ok(())
    }

    /// Lists the names of the children of `path`, in the order the store
    /// returns them.
    pub async fn list(
        &self,
        txn: TransactionId,
        path: &str,
    ) -> Result<Vec<String>> {
        let reply = self
            .request(MessageType::Directory, txn, &[nul_terminated(path).as_slice()])
            .await?;
        Ok(split_nul_terminated(&reply.payload)?)
    }

    /// Removes `path` and everything below it.
    pub async fn remove(
        &self,
        txn: TransactionId,
        path: &str,
    ) -> Result<()> {
        self.request(MessageType::Rm, txn, &[nul_terminated(path).as_slice()])
            .await?;
        Ok(())
    }

    /// Permission list of `path`. The first entry names the owner and the
    /// access granted to domains not listed.
    pub async fn get_permissions(
        &self,
        txn: TransactionId,
        path: &str,
    ) -> Result<Vec<NodePermission>> {
        let reply = self
            .request(MessageType::GetPerms, txn, &[nul_terminated(path).as_slice()])
            .await?;
        split_nul_terminated(&reply.payload)?
            .iter()
            .map(|entry| entry.parse::<NodePermission>().map_err(Into::into))
            .collect()
    }

    /// Grants `perm` on `path` to `domid`.
    pub async fn set_permissions(
        &self,
        txn: TransactionId,
        path: &str,
        domid: u16,
        perm: Permission,
    ) -> Result<()> {
        let entry = NodePermission { domid, perm }.to_string();
        self.request(
            MessageType::SetPerms,
            txn,
            &[nul_terminated(path).as_slice(), nul_terminated(&entry).as_slice()],
        )
        .await?;
        Ok(())
    }

    /// Asks the store daemon to print `message` to its log.
    pub async fn debug(
        &self,
        message: &str,
    ) -> Result<()> {
        debug!(%message, "sending debug message");
        self.request(
            MessageType::Debug,
            TransactionId::NIL,
            &[nul_terminated(DEBUG_PRINT).as_slice(), nul_terminated(message).as_slice()],
        )
        .await?;
        Ok(())
    }

    /// Reads `path` outside any transaction and parses it as a decimal
    /// integer.
    ///
    /// # Errors
    /// - [`RemoteError::Invalid`] when the value is not a decimal integer
    pub async fn read_integer(
        &self,
        path: &str,
    ) -> Result<i64> {
        self.read_parsed(TransactionId::NIL, path).await
    }

    /// Writes `value` formatted with `Display` to `<node>/<path>`.
    pub async fn write_node(
        &self,
        txn: TransactionId,
        node: &str,
        path: &str,
        value: impl Display,
    ) -> Result<()> {
        let full_path = format!("{node}/{path}");
        self.write(txn, &full_path, value.to_string()).await
    }

    /// This guest's domain id, read from the relative `domid` node.
    pub async fn get_self_id(&self) -> Result<u16> {
        self.read_parsed(TransactionId::NIL, DOMID_PATH).await
    }

    pub(super) async fn read_parsed<T: FromStr>(
        &self,
        txn: TransactionId,
        path: &str,
    ) -> Result<T> {
        let value = self.read_string(txn, path).await?;
        value.trim_end_matches('\0').trim().parse::<T>().map_err(|_| {
            debug!(%path, %value, "value does not parse");
            RemoteError::Invalid.into()
        })
    }
}
