use sqlx::PgConnection;

/// A handle to an active database connection. Driven-port implementations borrow the raw
/// connection out of the handle to execute queries against it.
pub trait ConnectionHandle {
    fn borrow_connection(&mut self) -> &mut PgConnection;
}

/// Access to the services this application depends on. Implementations decide whether a
/// handed-out connection participates in a transaction, so domain code written against this
/// trait runs unchanged inside and outside one.
pub trait ExternalConnectivity {
    type Handle<'cxn>: ConnectionHandle + Send
    where
        Self: 'cxn;

    /// Acquires a database connection from this source.
    async fn database_cxn(&mut self) -> Result<Self::Handle<'_>, anyhow::Error>;
}

/// An in-progress transaction which can be committed. Dropping the handle without calling
/// [TransactionHandle::commit] rolls the whole unit back, so an early `?` return from a
/// multi-step write leaves nothing behind.
pub trait TransactionHandle {
    async fn commit(self) -> Result<(), anyhow::Error>;
}

/// A connection source which can open a transaction spanning every write made through the
/// returned handle.
pub trait Transactable {
    type Handle: ExternalConnectivity + TransactionHandle + Send;

    async fn start_transaction(&self) -> Result<Self::Handle, anyhow::Error>;
}

#[cfg(test)]
pub mod test_util {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Stand-in connectivity for unit tests. Driven-port fakes never touch a real
    /// database, so acquiring a connection from this type is a test bug and panics.
    /// Transactions are tracked so tests can assert that a unit of work was committed.
    pub struct FakeExternalConnectivity {
        is_transacting: bool,
        downstream_committed: Arc<AtomicBool>,
    }

    impl FakeExternalConnectivity {
        pub fn new() -> Self {
            Self {
                is_transacting: false,
                downstream_committed: Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn is_in_transaction(&self) -> bool {
            self.is_transacting
        }

        /// True once a transaction handed out by [Transactable::start_transaction]
        /// on this fake has been committed.
        pub fn transaction_committed(&self) -> bool {
            self.downstream_committed.load(Ordering::SeqCst)
        }
    }

    /// Uninhabited connection handle for [FakeExternalConnectivity] — no value of this
    /// type can ever be produced.
    pub enum NoDatabase {}

    impl ConnectionHandle for NoDatabase {
        fn borrow_connection(&mut self) -> &mut PgConnection {
            match *self {}
        }
    }

    impl ExternalConnectivity for FakeExternalConnectivity {
        type Handle<'cxn>
            = NoDatabase
        where
            Self: 'cxn;

        async fn database_cxn(&mut self) -> Result<NoDatabase, anyhow::Error> {
            panic!("Tried to acquire a real database connection through a test fake")
        }
    }

    impl TransactionHandle for FakeExternalConnectivity {
        async fn commit(self) -> Result<(), anyhow::Error> {
            if !self.is_transacting {
                panic!("Tried to commit a FakeExternalConnectivity that was not in a transaction");
            }

            self.downstream_committed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Transactable for FakeExternalConnectivity {
        type Handle = FakeExternalConnectivity;

        async fn start_transaction(&self) -> Result<FakeExternalConnectivity, anyhow::Error> {
            Ok(FakeExternalConnectivity {
                is_transacting: true,
                downstream_committed: Arc::clone(&self.downstream_committed),
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn commits_are_visible_through_the_originating_fake() {
            let ext_cxn = FakeExternalConnectivity::new();
            assert!(!ext_cxn.is_in_transaction());

            let txn = ext_cxn
                .start_transaction()
                .await
                .expect("fake transactions cannot fail to start");
            assert!(txn.is_in_transaction());
            assert!(!ext_cxn.transaction_committed());

            txn.commit().await.expect("fake commits cannot fail");
            assert!(ext_cxn.transaction_committed());
        }

        #[tokio::test]
        async fn dropped_transactions_never_count_as_committed() {
            let ext_cxn = FakeExternalConnectivity::new();

            {
                let _txn = ext_cxn
                    .start_transaction()
                    .await
                    .expect("fake transactions cannot fail to start");
            }

            assert!(!ext_cxn.transaction_committed());
        }
    }
}
